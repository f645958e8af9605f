//! 次に実行する文の変更

mod common;

use common::{Harness, BASE_DIR};
use hibari_core::{DebugError, DebuggerConfig, Location, StopReason, Value};
use hibari_target::mock::{Expr, MethodDef, Program, Stmt};

/// ```text
///  1 def work
///  2   a = 1
///  3   puts "two"
///  4   b = 2
///  5   begin
///  6     raise RuntimeError, "boom"
///  7   rescue RuntimeError
///  8     puts "rescued"
///  9   end
/// 10   puts "done"
/// 11 end
/// 12 work
/// ```
fn jump_program() -> Program {
    Program::new("/work/jump.rb")
        .method(MethodDef::new(
            "work",
            1,
            11,
            vec![
                Stmt::assign(2, "a", Expr::int(1)),
                Stmt::puts(3, Expr::str("two")),
                Stmt::assign(4, "b", Expr::int(2)),
                Stmt::begin(
                    5,
                    vec![Stmt::raise(
                        6,
                        &["RuntimeError", "StandardError", "Exception"],
                        "boom",
                    )],
                    &["RuntimeError"],
                    7,
                    vec![Stmt::puts(8, Expr::str("rescued"))],
                    9,
                ),
                Stmt::puts(10, Expr::str("done")),
            ],
        ))
        .main(vec![Stmt::call(12, "work", vec![])])
}

#[test]
fn test_jump_skips_intervening_statements() {
    let h = Harness::new(jump_program());
    let bp = h.debugger.add_breakpoint("jump.rb", 3, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Breakpoint(bp));

    h.debugger.jump(ctx, 10).unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Jump);
    assert_eq!(h.debugger.stop_reason(ctx).unwrap(), StopReason::Jump);

    let frame = h.debugger.frame_info(ctx, 0).unwrap();
    assert_eq!(frame.line, 10);
    assert_eq!(frame.method.as_deref(), Some("work"));

    // 同じスコープのまま、飛ばした文は実行されていない
    let binding = h.debugger.frame_binding(ctx, 0).unwrap();
    assert_eq!(binding.get("a"), Some(Value::Int(1)));
    assert!(!binding.has("b"));

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    let outcome = h.join(handle);
    assert_eq!(outcome.output, vec!["done"]);
    assert!(outcome.uncaught.is_none());
}

#[test]
fn test_invalid_jump_leaves_execution_unaffected() {
    let h = Harness::new(jump_program());
    let bp = h.debugger.add_breakpoint("jump.rb", 3, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();

    // rescue 節の中へは入れない
    assert!(matches!(h.debugger.jump(ctx, 8), Err(DebugError::Jump(_))));
    // 別のメソッド（トップレベル）へは移れない
    assert!(matches!(h.debugger.jump(ctx, 12), Err(DebugError::Jump(_))));
    // 文の先頭でない行
    assert!(matches!(h.debugger.jump(ctx, 1), Err(DebugError::Jump(_))));

    let info = h.debugger.context_info(ctx).unwrap();
    assert!(info.suspended);
    assert_eq!(info.stop_reason, StopReason::Breakpoint(bp));
    assert_eq!(info.line, Some(3));

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    assert_eq!(h.join(handle).output, vec!["two", "rescued", "done"]);
}

#[test]
fn test_jump_cannot_cross_protected_body() {
    let h = Harness::new(jump_program());
    h.debugger.add_breakpoint("jump.rb", 3, None).unwrap();
    let body_bp = h.debugger.add_breakpoint("jump.rb", 6, None).unwrap();
    let handle = h.spawn(1);

    // begin 本体の外から中へは入れない
    let (ctx, _) = h.wait_suspended();
    match h.debugger.jump(ctx, 6) {
        Err(DebugError::Jump(msg)) => assert!(msg.contains("Begin"), "{}", msg),
        other => panic!("unexpected result: {:?}", other),
    }

    h.debugger.resume(ctx).unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Breakpoint(body_bp));

    // begin 本体の中から外へも出られない
    match h.debugger.jump(ctx, 10) {
        Err(DebugError::Jump(msg)) => assert!(msg.contains("Begin"), "{}", msg),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.debugger.context_info(ctx).unwrap().line, Some(6));

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    assert_eq!(h.join(handle).output, vec!["two", "rescued", "done"]);
}

#[test]
fn test_host_rejects_jump_for_unregistered_file() {
    let config = DebuggerConfig::new().with_base_dir(BASE_DIR);
    let h = Harness::unregistered(jump_program(), config);
    h.debugger.add_breakpoint("jump.rb", 3, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();
    let err = h.debugger.jump(ctx, 8).unwrap_err();
    assert!(matches!(err, DebugError::Jump(_)));
    assert!(h.debugger.context_info(ctx).unwrap().suspended);

    // ホストが受け付ける行なら成功する
    h.debugger.jump(ctx, 4).unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Jump);

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    assert_eq!(h.join(handle).output, vec!["rescued", "done"]);
}

#[test]
fn test_jump_requires_statement_boundary() {
    let h = Harness::new(jump_program());
    let bp = h
        .debugger
        .add_breakpoint_at(
            Location::Method {
                class: None,
                method: "work".into(),
            },
            None,
            None,
        )
        .unwrap();
    let handle = h.spawn(1);

    // 呼び出しイベントで停止している
    let (ctx, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Breakpoint(bp));
    assert!(matches!(h.debugger.jump(ctx, 4), Err(DebugError::Jump(_))));

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    h.join(handle);
}
