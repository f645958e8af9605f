//! 実行イベントの振り分け
//!
//! ホストから届いたイベントごとに、コンテキストを解決して呼び出しスタックを更新し、
//! ステップ制御・ブレークポイント・キャッチポイントの順に停止を判定します。
//! 停止する場合はイベントを発生させたスレッド自身がここでブロックします。

use crate::breakpoint::Candidate;
use crate::condition::ConditionEvaluator;
use crate::{
    BreakpointId, BreakpointTable, CatchpointTable, Context, ContextId, ContextRegistry,
    DebugListener, DebuggerConfig, StopReason,
};
use hibari_source::{normalize_path, SourceIndex};
use hibari_stack::Frame;
use hibari_target::{Binding, EventKind, EventSink, ExecEvent, Host};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// 単一のロックで保護される共有テーブル
///
/// ロック順序: `Shared` → コンテキストの状態。逆順で取得してはならない。
pub(crate) struct Shared {
    pub breakpoints: BreakpointTable,
    pub catchpoints: CatchpointTable,
    pub registry: ContextRegistry,
    pub sources: SourceIndex,
    /// 最後に停止したコンテキスト
    pub last_context: Option<ContextId>,
}

/// `start()` から `stop()` までのデバッグセッション
pub(crate) struct Session {
    pub host: Arc<dyn Host>,
    pub shared: Mutex<Shared>,
    listeners: RwLock<Vec<Arc<dyn DebugListener>>>,
    pub base_dir: PathBuf,
    pub post_mortem: AtomicBool,
    pub tracing: AtomicBool,
    pub skip_next_exception: AtomicBool,
    pub stopped: AtomicBool,
    suspend_seq: AtomicU64,
}

impl Session {
    pub fn new(host: Arc<dyn Host>, config: &DebuggerConfig) -> Self {
        Self {
            host,
            shared: Mutex::new(Shared {
                breakpoints: BreakpointTable::new(),
                catchpoints: CatchpointTable::new(),
                registry: ContextRegistry::new(),
                sources: SourceIndex::new(config.base_dir.clone()),
                last_context: None,
            }),
            listeners: RwLock::new(Vec::new()),
            base_dir: config.base_dir.clone(),
            post_mortem: AtomicBool::new(config.post_mortem),
            tracing: AtomicBool::new(config.tracing),
            skip_next_exception: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            suspend_seq: AtomicU64::new(0),
        }
    }

    /// パスを基準ディレクトリに対して正規化する
    pub fn normalize(&self, file: &str) -> String {
        normalize_path(&self.base_dir, file)
            .to_string_lossy()
            .into_owned()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn post_mortem(&self) -> bool {
        self.post_mortem.load(Ordering::SeqCst)
    }

    pub fn add_listener(&self, listener: Arc<dyn DebugListener>) {
        self.listeners.write().push(listener);
    }

    /// ロックを保持せずに全リスナーへ通知する
    pub fn notify<F: Fn(&dyn DebugListener)>(&self, f: F) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    fn next_suspend_seq(&self) -> u64 {
        self.suspend_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// スタック更新後の状態
struct StackView {
    depth: usize,
    binding: Option<Binding>,
    traced: bool,
}

/// イベントディスパッチャ
pub struct EventDispatcher {
    session: Arc<Session>,
}

impl EventDispatcher {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// イベントを処理する（停止した場合は再開されるまで戻らない）
    pub fn dispatch(&self, event: ExecEvent) {
        if self.session.is_stopped() {
            return;
        }
        trace!(
            "{} event on {} at {}:{}",
            event.kind.name(),
            event.tid,
            event.file,
            event.line
        );

        if event.kind == EventKind::ThreadExit {
            self.on_thread_exit(&event);
            return;
        }

        let ctx = self.session.shared.lock().registry.get_or_create(event.tid);
        if ctx.is_ignored() {
            ctx.record_ignored_event();
            return;
        }

        let view = self.update_stack(&ctx, &event);

        if view.traced {
            self.session
                .notify(|l| l.on_trace(ctx.id(), &event.file, event.line));
        }

        if let Some(reason) = self.decide(&ctx, &event, &view) {
            self.suspend(&ctx, reason);
        }

        if event.pops_frame() {
            ctx.state().frames.pop(event.return_value);
        }
    }

    /// 呼び出しスタックを更新する
    ///
    /// 復帰イベントではフレームを降ろさず戻り値だけ記録する（停止中もフレーム0に残る）。
    fn update_stack(&self, ctx: &Context, event: &ExecEvent) -> StackView {
        let mut state = ctx.state();
        state.last_event = Some(event.kind);
        if !event.file.is_empty() {
            state.last_file = event.file.clone();
            state.last_line = event.line;
        }

        match event.kind {
            EventKind::Call | EventKind::ClassEnter => {
                state.frames.push(Frame::from_event(event));
            }
            EventKind::Line => {
                state.frames.set_top_line(event.line);
            }
            EventKind::Return | EventKind::ClassExit => {
                state.frames.set_top_return_value(event.return_value.clone());
            }
            EventKind::Raise => {
                // 事後解析を残すかは終了時に決める
                state.exception_snapshot = Some(state.frames.snapshot());
            }
            EventKind::Rescue => {
                state.exception_snapshot = None;
            }
            EventKind::ThreadCreate => {
                if let Some(binding) = &event.binding {
                    state.top_binding = Some(binding.clone());
                }
            }
            EventKind::ThreadExit => {}
        }

        let traced = event.kind == EventKind::Line
            && (state.tracing || self.session.tracing.load(Ordering::SeqCst));
        let binding = state
            .frames
            .binding(0)
            .cloned()
            .or_else(|| state.top_binding.clone());

        StackView {
            depth: state.frames.depth(),
            binding,
            traced,
        }
    }

    /// 停止するかを判定する（ステップ → ブレークポイント → キャッチポイント）
    ///
    /// ブレークポイントのヒット回数は、ステップで停止が決まっていても数える。
    fn decide(&self, ctx: &Context, event: &ExecEvent, view: &StackView) -> Option<StopReason> {
        let is_located = matches!(
            event.kind,
            EventKind::Line | EventKind::Call | EventKind::Return | EventKind::ClassExit
        );
        let file = if is_located {
            self.session.normalize(&event.file)
        } else {
            String::new()
        };

        let mut reason = {
            let mut state = ctx.state();
            if event.kind == EventKind::Line && state.pending_jump {
                state.pending_jump = false;
                Some(StopReason::Jump)
            } else if event.kind == EventKind::Line && state.pause_requested {
                state.pause_requested = false;
                Some(StopReason::Step)
            } else if state.step.on_event(event.kind, view.depth, &file, event.line) {
                Some(StopReason::Step)
            } else {
                None
            }
        };

        match event.kind {
            EventKind::Line => {
                let candidates = self
                    .session
                    .shared
                    .lock()
                    .breakpoints
                    .line_candidates(&file, event.line);
                if let Some(id) = self.match_breakpoints(ctx, candidates, view) {
                    reason.get_or_insert(StopReason::Breakpoint(id));
                }
            }
            EventKind::Call => {
                if let Some(method) = &event.method {
                    let candidates = self
                        .session
                        .shared
                        .lock()
                        .breakpoints
                        .call_candidates(event.class.as_deref(), method);
                    if let Some(id) = self.match_breakpoints(ctx, candidates, view) {
                        reason.get_or_insert(StopReason::Breakpoint(id));
                    }
                }
            }
            EventKind::Raise => {
                if let Some(name) = self.match_catchpoints(event) {
                    reason.get_or_insert(StopReason::Catchpoint(name));
                }
            }
            _ => {}
        }

        reason
    }

    /// 候補の条件式をロック外で評価し、成立したものだけヒットを記録する
    fn match_breakpoints(
        &self,
        ctx: &Context,
        candidates: Vec<Candidate>,
        view: &StackView,
    ) -> Option<BreakpointId> {
        if candidates.is_empty() {
            return None;
        }

        let evaluator = ConditionEvaluator::new(self.session.host.as_ref());
        let fallback = Binding::method();
        let binding = view.binding.as_ref().unwrap_or(&fallback);

        let mut triggered = None;
        for candidate in candidates {
            if let Some(condition) = &candidate.condition {
                if !evaluator.holds(ctx, condition, binding) {
                    continue;
                }
            }
            let hit = self
                .session
                .shared
                .lock()
                .breakpoints
                .record_hit(candidate.id);
            debug!("breakpoint {} hit (trigger: {})", candidate.id, hit);
            if hit && triggered.is_none() {
                triggered = Some(candidate.id);
            }
        }
        triggered
    }

    fn match_catchpoints(&self, event: &ExecEvent) -> Option<String> {
        let exception = event.exception.as_ref()?;
        if self.session.skip_next_exception.swap(false, Ordering::SeqCst) {
            debug!("skipping catchpoints for {}", exception.class_name());
            return None;
        }
        self.session
            .shared
            .lock()
            .catchpoints
            .match_chain(&exception.class_chain)
    }

    /// コンテキストを停止し、再開されるまでブロックする
    fn suspend(&self, ctx: &Arc<Context>, reason: StopReason) {
        let seq = self.session.next_suspend_seq();
        {
            let mut state = ctx.state();
            state.suspended = true;
            state.stop_reason = reason.clone();
            state.suspend_seq = seq;
            state.step.cancel();
        }
        self.session.shared.lock().last_context = Some(ctx.id());

        info!("context {} suspended: {}", ctx.id(), reason);
        self.session.notify(|l| l.on_suspend(ctx.id(), &reason));

        ctx.wait_while_suspended(&self.session.stopped);
        debug!("context {} continues", ctx.id());
    }

    fn on_thread_exit(&self, event: &ExecEvent) {
        let post_mortem = self.session.post_mortem();
        let ctx = {
            let mut shared = self.session.shared.lock();
            let ctx = match shared.registry.mark_dead(event.tid, event.exception.clone()) {
                Some(ctx) => ctx,
                None => return,
            };
            if ctx.is_internal() || !post_mortem {
                shared.registry.remove(ctx.id()).ok();
            }
            ctx
        };

        if ctx.is_internal() {
            return;
        }
        match &event.exception {
            Some(exception) => info!(
                "context {} died: {}: {}",
                ctx.id(),
                exception.class_name(),
                exception.message
            ),
            None => info!("context {} finished", ctx.id()),
        }
        self.session.notify(|l| l.on_thread_exit(ctx.id()));
    }
}

impl EventSink for EventDispatcher {
    fn on_event(&self, event: ExecEvent) {
        self.dispatch(event);
    }
}
