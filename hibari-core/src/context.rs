//! スレッドごとのデバッグコンテキスト

use crate::{BreakpointId, StepController};
use hibari_stack::{Frame, FrameStack};
use hibari_target::{Binding, EventKind, ExceptionInfo, Tid, Value};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// コンテキストID（1から採番）
pub type ContextId = usize;

/// 停止理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    None,
    Step,
    Breakpoint(BreakpointId),
    Catchpoint(String),
    Jump,
    PostMortem,
}

impl StopReason {
    /// 表示用の名前
    pub fn name(&self) -> &'static str {
        match self {
            StopReason::None => "none",
            StopReason::Step => "step",
            StopReason::Breakpoint(_) => "breakpoint",
            StopReason::Catchpoint(_) => "catchpoint",
            StopReason::Jump => "jump",
            StopReason::PostMortem => "post_mortem",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Breakpoint(id) => write!(f, "breakpoint({})", id),
            StopReason::Catchpoint(name) => write!(f, "catchpoint({})", name),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// コンテキストの可変状態
///
/// 書き込むのは所有スレッドのイベント処理と、停止中のコンテキストに対する
/// コントローラのコマンドのみです。
#[derive(Debug)]
pub struct ContextState {
    pub frames: FrameStack,
    pub step: StepController,
    pub suspended: bool,
    pub dead: bool,
    pub stop_reason: StopReason,
    /// 停止した順序（`current_context` の選択に使う）
    pub suspend_seq: u64,
    pub last_event: Option<EventKind>,
    pub last_file: String,
    pub last_line: u32,
    /// トップレベルのスコープ（フレームとしては扱わない）
    pub top_binding: Option<Binding>,
    pub tracing: bool,
    /// 次の行イベントでjump完了として停止する
    pub pending_jump: bool,
    /// 次の行イベントで停止する
    pub pause_requested: bool,
    /// 最後の例外送出時のスタック
    pub exception_snapshot: Option<FrameStack>,
    /// スレッドを終了させた例外
    pub exit_exception: Option<ExceptionInfo>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            frames: FrameStack::new(),
            step: StepController::new(),
            suspended: false,
            dead: false,
            stop_reason: StopReason::None,
            suspend_seq: 0,
            last_event: None,
            last_file: String::new(),
            last_line: 0,
            top_binding: None,
            tracing: false,
            pending_jump: false,
            pause_requested: false,
            exception_snapshot: None,
            exit_exception: None,
        }
    }

    /// 現在位置（フレームがなければ最後のイベントの位置）
    pub fn position(&self) -> Option<(String, u32)> {
        match self.frames.top() {
            Some(frame) => Some((frame.file.clone(), frame.line)),
            None if !self.last_file.is_empty() => Some((self.last_file.clone(), self.last_line)),
            None => None,
        }
    }
}

/// デバッグコンテキスト
///
/// 監視対象のスレッド一つにつき一つ作成されます。
pub struct Context {
    id: ContextId,
    tid: Tid,
    /// デバッガ自身のスレッド（恒久的に無視）
    internal: AtomicBool,
    /// デバッガ内部の評価中
    ignored: AtomicBool,
    ignored_events: AtomicU64,
    state: Mutex<ContextState>,
    resumed: Condvar,
}

impl Context {
    pub(crate) fn new(id: ContextId, tid: Tid, internal: bool) -> Self {
        Self {
            id,
            tid,
            internal: AtomicBool::new(internal),
            ignored: AtomicBool::new(false),
            ignored_events: AtomicU64::new(0),
            state: Mutex::new(ContextState::new()),
            resumed: Condvar::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// デバッガ自身のスレッドか
    pub fn is_internal(&self) -> bool {
        self.internal.load(Ordering::SeqCst)
    }

    /// 以降このスレッドのイベントを恒久的に無視する
    pub(crate) fn mark_internal(&self) {
        self.internal.store(true, Ordering::SeqCst);
    }

    /// イベントを無視すべきか
    pub fn is_ignored(&self) -> bool {
        self.is_internal() || self.ignored.load(Ordering::SeqCst)
    }

    /// 無視している間に受け取ったイベント数
    pub fn ignored_events(&self) -> u64 {
        self.ignored_events.load(Ordering::SeqCst)
    }

    pub(crate) fn record_ignored_event(&self) {
        self.ignored_events.fetch_add(1, Ordering::SeqCst);
    }

    /// ガードが生きている間、このコンテキストのイベントを無視する
    pub(crate) fn ignore_guard(&self) -> IgnoreGuard<'_> {
        let previous = self.ignored.swap(true, Ordering::SeqCst);
        IgnoreGuard {
            context: self,
            previous,
        }
    }

    /// 状態をロックする
    pub fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock()
    }

    /// 停止中かどうか
    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// 終了済みかどうか
    pub fn is_dead(&self) -> bool {
        self.state.lock().dead
    }

    /// 再開されるか `stopped` が立つまで呼び出しスレッドをブロックする
    pub(crate) fn wait_while_suspended(&self, stopped: &AtomicBool) {
        let mut state = self.state.lock();
        while state.suspended && !stopped.load(Ordering::SeqCst) {
            self.resumed.wait(&mut state);
        }
        state.suspended = false;
    }

    /// 停止を解除する（停止していた場合は true）
    pub(crate) fn release(&self) -> bool {
        let was_suspended = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.suspended, false)
        };
        self.resumed.notify_all();
        was_suspended
    }

    /// 終了済みにしてスタックを凍結する
    ///
    /// 捕捉されなかった例外で終了した場合は送出時のスナップショットを残す。
    pub(crate) fn mark_dead(&self, uncaught: Option<ExceptionInfo>) {
        {
            let mut state = self.state.lock();
            state.dead = true;
            state.suspended = false;
            state.step.cancel();
            state.pending_jump = false;
            state.pause_requested = false;
            state.stop_reason = StopReason::PostMortem;

            let snapshot = state.exception_snapshot.take();
            state.frames = match (&uncaught, snapshot) {
                (Some(_), Some(snapshot)) => snapshot,
                _ => state.frames.snapshot(),
            };
            state.exit_exception = uncaught;
        }
        self.resumed.notify_all();
    }

    /// 現在の状態の要約
    pub fn info(&self) -> ContextInfo {
        let state = self.state.lock();
        let position = state.position();
        ContextInfo {
            id: self.id,
            tid: self.tid,
            suspended: state.suspended,
            dead: state.dead,
            ignored: self.is_ignored(),
            stack_size: state.frames.depth(),
            stop_reason: state.stop_reason.clone(),
            file: position.as_ref().map(|(file, _)| file.clone()),
            line: position.map(|(_, line)| line),
            tracing: state.tracing,
            exception: state.exit_exception.clone(),
            ignored_events: self.ignored_events(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("tid", &self.tid)
            .field("internal", &self.is_internal())
            .finish()
    }
}

/// 無視フラグを元に戻すガード
pub(crate) struct IgnoreGuard<'a> {
    context: &'a Context,
    previous: bool,
}

impl Drop for IgnoreGuard<'_> {
    fn drop(&mut self) {
        self.context.ignored.store(self.previous, Ordering::SeqCst);
    }
}

/// コンテキストの要約（コントローラ向け）
#[derive(Debug, Clone, PartialEq)]
pub struct ContextInfo {
    pub id: ContextId,
    pub tid: Tid,
    pub suspended: bool,
    pub dead: bool,
    pub ignored: bool,
    pub stack_size: usize,
    pub stop_reason: StopReason,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub tracing: bool,
    pub exception: Option<ExceptionInfo>,
    pub ignored_events: u64,
}

/// フレームの要約
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    pub index: usize,
    pub file: String,
    pub line: u32,
    pub method: Option<String>,
    pub class: Option<String>,
    pub is_block: bool,
    pub args: Vec<String>,
    pub return_value: Option<Value>,
}

impl FrameInfo {
    pub(crate) fn from_frame(index: usize, frame: &Frame) -> Self {
        Self {
            index,
            file: frame.file.clone(),
            line: frame.line,
            method: frame.method.clone(),
            class: frame.class.clone(),
            is_block: frame.is_block,
            args: frame.args.clone(),
            return_value: frame.return_value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_guard_restores() {
        let ctx = Context::new(1, Tid(7), false);
        assert!(!ctx.is_ignored());
        {
            let _outer = ctx.ignore_guard();
            assert!(ctx.is_ignored());
            {
                let _inner = ctx.ignore_guard();
            }
            assert!(ctx.is_ignored());
        }
        assert!(!ctx.is_ignored());
        assert!(Context::new(2, Tid(8), true).is_ignored());
    }

    #[test]
    fn test_mark_dead_keeps_exception_snapshot() {
        let ctx = Context::new(1, Tid(7), false);
        {
            let mut state = ctx.state();
            state.frames.push(Frame::new("/app.rb", 3, Binding::method()));
            state.exception_snapshot = Some(state.frames.snapshot());
            state.frames.pop(None);
        }

        ctx.mark_dead(Some(ExceptionInfo::new(vec!["RuntimeError".into()], "boom")));

        let info = ctx.info();
        assert!(info.dead);
        assert_eq!(info.stack_size, 1);
        assert_eq!(info.stop_reason, StopReason::PostMortem);
        assert!(ctx.state().frames.is_frozen());
    }

    #[test]
    fn test_release_reports_previous_state() {
        let ctx = Context::new(1, Tid(7), false);
        assert!(!ctx.release());
        ctx.state().suspended = true;
        assert!(ctx.release());
        assert!(!ctx.is_suspended());
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Breakpoint(3).to_string(), "breakpoint(3)");
        assert_eq!(StopReason::Catchpoint("RuntimeError".into()).to_string(), "catchpoint(RuntimeError)");
        assert_eq!(StopReason::Jump.to_string(), "jump");
    }
}
