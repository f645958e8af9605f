//! ステップ実行と指定行までの実行

mod common;

use common::Harness;
use hibari_core::{Command, DebugError, StepMode, StopReason, Value};
use hibari_target::mock::{Expr, MethodDef, Program, Stmt};

/// ```text
///  1 def inner(x)
///  2   y = x * 2
///  3   z = y + 1
///  4 end
///  6 def outer
///  7   a = 1
///  8   b = inner(a)
///  9   c = b + 1
/// 10   d = c
/// 11 end
/// 13 r = outer
/// 14 puts r
/// ```
fn next_program() -> Program {
    Program::new("/work/next.rb")
        .method(
            MethodDef::new(
                "inner",
                1,
                4,
                vec![
                    Stmt::assign(2, "y", Expr::mul(Expr::var("x"), Expr::int(2))),
                    Stmt::assign(3, "z", Expr::add(Expr::var("y"), Expr::int(1))),
                ],
            )
            .with_params(&["x"]),
        )
        .method(MethodDef::new(
            "outer",
            6,
            11,
            vec![
                Stmt::assign(7, "a", Expr::int(1)),
                Stmt::call_assign(8, "b", "inner", vec![Expr::var("a")]),
                Stmt::assign(9, "c", Expr::add(Expr::var("b"), Expr::int(1))),
                Stmt::assign(10, "d", Expr::var("c")),
            ],
        ))
        .main(vec![
            Stmt::call_assign(13, "r", "outer", vec![]),
            Stmt::puts(14, Expr::var("r")),
        ])
}

fn current_line(h: &Harness, ctx: usize) -> u32 {
    h.debugger.frame_info(ctx, 0).unwrap().line
}

#[test]
fn test_step_over_does_not_enter_callee() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 8, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Breakpoint(1));
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 1);

    h.debugger.step(ctx, StepMode::Over).unwrap();
    let (again, reason) = h.wait_suspended();
    assert_eq!(again, ctx);
    assert_eq!(reason, StopReason::Step);
    assert_eq!(current_line(&h, ctx), 9);
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 1);
    assert_eq!(
        h.debugger.frame_binding(ctx, 0).unwrap().get("b"),
        Some(Value::Int(3))
    );

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    assert_eq!(h.join(handle).output, vec!["4"]);
}

#[test]
fn test_step_into_stops_inside_callee() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 8, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();
    h.debugger.step(ctx, StepMode::Into).unwrap();

    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Step);
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 2);

    let frame = h.debugger.frame_info(ctx, 0).unwrap();
    assert_eq!(frame.method.as_deref(), Some("inner"));
    assert_eq!(frame.line, 2);
    assert_eq!(
        h.debugger.frame_args(ctx, 0).unwrap(),
        vec![("x".to_string(), Some(Value::Int(1)))]
    );

    // inner から抜けると呼び出し元の次の行で止まる
    h.debugger.step(ctx, StepMode::Out).unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Step);
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 1);
    assert_eq!(current_line(&h, ctx), 9);

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    h.join(handle);
}

#[test]
fn test_step_over_stops_at_return_with_value() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 10, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();
    h.debugger.step(ctx, StepMode::Over).unwrap();

    // 復帰イベントで停止している間、復帰するフレームはまだ0番
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Step);
    let frame = h.debugger.frame_info(ctx, 0).unwrap();
    assert_eq!(frame.method.as_deref(), Some("outer"));
    assert_eq!(frame.return_value, Some(Value::Int(4)));

    h.debugger.step(ctx, StepMode::Over).unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Step);
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 0);
    assert_eq!(h.debugger.context_info(ctx).unwrap().line, Some(14));

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    h.join(handle);
}

#[test]
fn test_step_counts_and_commands() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 7, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();

    // 7 -> 8 -> 2（inner の中）
    h.debugger
        .execute(ctx, Command::parse("step 2").unwrap())
        .unwrap();
    h.wait_suspended();
    assert_eq!(current_line(&h, ctx), 2);

    // 呼び出し元のフレームを基準に next: inner を抜けて 9 で止まる
    h.debugger.step_over(ctx, 1, 1).unwrap();
    h.wait_suspended();
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 1);
    assert_eq!(current_line(&h, ctx), 9);

    assert!(matches!(
        h.debugger.step_over(ctx, 1, 5),
        Err(DebugError::FrameIndex { index: 5, depth: 1 })
    ));

    h.debugger
        .execute(ctx, Command::parse("until 14").unwrap())
        .unwrap();
    let (_, reason) = h.wait_suspended();
    assert_eq!(reason, StopReason::Step);
    assert_eq!(h.debugger.stack_size(ctx).unwrap(), 0);
    assert_eq!(h.debugger.context_info(ctx).unwrap().line, Some(14));

    h.debugger.execute(ctx, Command::Continue).unwrap();
    h.wait_exit();
    assert_eq!(h.join(handle).output, vec!["4"]);
}

#[test]
fn test_continue_to_rejects_non_statement_line() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 7, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();
    assert!(matches!(
        h.debugger.continue_to(ctx, 12),
        Err(DebugError::Location { line: 12, .. })
    ));
    assert!(h.debugger.context_info(ctx).unwrap().suspended);

    h.debugger.resume(ctx).unwrap();
    h.wait_exit();
    h.join(handle);
}

#[test]
fn test_commands_on_running_context_fail() {
    let h = Harness::new(next_program());
    h.debugger.add_breakpoint("next.rb", 7, None).unwrap();
    let handle = h.spawn(1);

    let (ctx, _) = h.wait_suspended();
    assert_eq!(h.debugger.current_context().unwrap().id, ctx);
    assert!(!h.debugger.pause(ctx).unwrap());

    h.debugger.resume(ctx).unwrap();
    // 再開直後の二重の再開は停止中でないので失敗するか、既に回収済み
    assert!(h.debugger.resume(ctx).is_err());

    h.wait_exit();
    h.join(handle);
    assert!(h.debugger.current_context().is_none());
}
