//! デバッガのメインロジック

use crate::condition::ConditionEvaluator;
use crate::context::ContextState;
use crate::dispatcher::{EventDispatcher, Session};
use crate::{
    Breakpoint, BreakpointId, Command, Context, ContextId, ContextInfo, DebugError,
    DebugListener, DebuggerConfig, FrameInfo, HitCondition, Location, Result, StepMode,
    StopReason,
};
use hibari_source::LineTable;
use hibari_target::{Binding, EventKind, Host, JumpRequest, Tid, Value};
use indexmap::IndexMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// デバッガ
///
/// `start()` でホストにフックを設定し、`stop()`（またはドロップ）で解除します。
/// 全ての制御APIはコントローラのスレッドから呼び出せます。
pub struct Debugger {
    session: Arc<Session>,
    dispatcher: Arc<EventDispatcher>,
}

impl Debugger {
    /// ホストにフックを設定してデバッグを開始する
    pub fn start(host: Arc<dyn Host>, config: DebuggerConfig) -> Result<Self> {
        let session = Arc::new(Session::new(host.clone(), &config));
        let dispatcher = Arc::new(EventDispatcher::new(session.clone()));
        host.install_hooks(dispatcher.clone())?;

        info!(
            "debugger started (post_mortem: {}, tracing: {}, base_dir: {})",
            config.post_mortem,
            config.tracing,
            config.base_dir.display()
        );
        Ok(Self {
            session,
            dispatcher,
        })
    }

    /// フックを解除し、停止中の全コンテキストを再開して状態を破棄する
    pub fn stop(&self) {
        if self.session.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.session.host.remove_hooks();

        let contexts = {
            let mut shared = self.session.shared.lock();
            let contexts = shared.registry.list();
            shared.breakpoints.clear();
            shared.catchpoints.clear();
            shared.registry.clear();
            shared.last_context = None;
            contexts
        };
        for ctx in &contexts {
            self.release(ctx);
        }
        info!("debugger stopped ({} contexts released)", contexts.len());
    }

    /// 開始済みか（`stop()` されていないか）
    pub fn is_started(&self) -> bool {
        !self.session.is_stopped()
    }

    /// イベントディスパッチャ（ホストアダプタが直接イベントを渡す場合に使う）
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        self.dispatcher.clone()
    }

    /// 通知リスナーを追加する
    pub fn add_listener(&self, listener: Arc<dyn DebugListener>) {
        self.session.add_listener(listener);
    }

    /// ファイルの行テーブルを登録する
    pub fn register_source(&self, table: LineTable) {
        self.session.shared.lock().sources.register(table);
    }

    fn ensure_started(&self) -> Result<()> {
        if self.session.is_stopped() {
            return Err(DebugError::NotStarted);
        }
        Ok(())
    }

    fn context(&self, id: ContextId) -> Result<Arc<Context>> {
        self.ensure_started()?;
        self.session.shared.lock().registry.get(id)
    }

    fn release(&self, ctx: &Context) {
        if ctx.release() {
            debug!("context {} released", ctx.id());
            self.session.notify(|l| l.on_resume(ctx.id()));
        }
    }

    /// 停止中のコンテキストの状態を更新して再開する
    fn command<F>(&self, id: ContextId, f: F) -> Result<()>
    where
        F: FnOnce(&mut ContextState) -> Result<()>,
    {
        let ctx = self.context(id)?;
        {
            let mut state = ctx.state();
            if state.dead {
                return Err(DebugError::DeadContext(id));
            }
            if !state.suspended {
                return Err(DebugError::NotStopped(id));
            }
            f(&mut state)?;
            state.stop_reason = StopReason::None;
        }
        self.release(&ctx);
        Ok(())
    }

    /// 停止中（または検査可能な終了済み）のコンテキストの状態を読む
    fn inspect<F, R>(&self, id: ContextId, f: F) -> Result<R>
    where
        F: FnOnce(&ContextState) -> Result<R>,
    {
        let ctx = self.context(id)?;
        let state = ctx.state();
        if state.dead {
            if !self.session.post_mortem() {
                return Err(DebugError::DeadContext(id));
            }
        } else if !state.suspended {
            return Err(DebugError::NotStopped(id));
        }
        f(&state)
    }

    // ---- ブレークポイント ----

    /// ファイルと行にブレークポイントを設定する
    pub fn add_breakpoint(
        &self,
        file: &str,
        line: u32,
        condition: Option<&str>,
    ) -> Result<BreakpointId> {
        let location = Location::Line {
            file: file.to_string(),
            line,
        };
        self.add_breakpoint_at(location, condition, None)
    }

    /// 位置文字列（`file:line`、`Class#method`）でブレークポイントを設定する
    pub fn set_breakpoint(
        &self,
        location: &str,
        condition: Option<&str>,
    ) -> Result<BreakpointId> {
        self.add_breakpoint_at(Location::parse(location)?, condition, None)
    }

    /// 位置・条件式・ヒット条件を指定してブレークポイントを設定する
    ///
    /// 登録済みのファイルで実行可能でない行を指定した場合は `Location` エラー。
    pub fn add_breakpoint_at(
        &self,
        location: Location,
        condition: Option<&str>,
        hit_condition: Option<HitCondition>,
    ) -> Result<BreakpointId> {
        self.ensure_started()?;

        let location = match location {
            Location::Line { file, line } => Location::Line {
                file: self.session.normalize(&file),
                line,
            },
            other => other,
        };

        let mut shared = self.session.shared.lock();
        if let Location::Line { file, line } = &location {
            if let Some(table) = shared.sources.get(file) {
                if !table.is_executable(*line) {
                    return Err(DebugError::Location {
                        file: file.clone(),
                        line: *line,
                    });
                }
            }
        }

        let shown = location.to_string();
        let id = shared
            .breakpoints
            .add(location, condition.map(str::to_string), hit_condition);
        info!("breakpoint {} set at {}", id, shown);
        Ok(id)
    }

    pub fn enable(&self, id: BreakpointId) -> Result<()> {
        self.ensure_started()?;
        self.session.shared.lock().breakpoints.enable(id)
    }

    pub fn disable(&self, id: BreakpointId) -> Result<()> {
        self.ensure_started()?;
        self.session.shared.lock().breakpoints.disable(id)
    }

    pub fn delete(&self, id: BreakpointId) -> Result<()> {
        self.ensure_started()?;
        self.session.shared.lock().breakpoints.delete(id)?;
        info!("breakpoint {} deleted", id);
        Ok(())
    }

    /// 条件式を変更する
    pub fn set_condition(&self, id: BreakpointId, condition: Option<&str>) -> Result<()> {
        self.ensure_started()?;
        self.session
            .shared
            .lock()
            .breakpoints
            .set_condition(id, condition.map(str::to_string))
    }

    /// ヒット条件を変更する
    pub fn set_hit_condition(&self, id: BreakpointId, hit: Option<HitCondition>) -> Result<()> {
        self.ensure_started()?;
        self.session
            .shared
            .lock()
            .breakpoints
            .set_hit_condition(id, hit)
    }

    /// ブレークポイントのスナップショット
    pub fn breakpoint(&self, id: BreakpointId) -> Result<Breakpoint> {
        self.ensure_started()?;
        self.session
            .shared
            .lock()
            .breakpoints
            .get(id)
            .cloned()
            .ok_or_else(|| DebugError::breakpoint_not_found(id))
    }

    /// 全ブレークポイント（ID順）
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.session
            .shared
            .lock()
            .breakpoints
            .all()
            .cloned()
            .collect()
    }

    // ---- キャッチポイント ----

    /// キャッチポイントを追加する（既存なら何もしない）
    pub fn add_catchpoint(&self, class_name: &str) -> Result<()> {
        self.ensure_started()?;
        self.session.shared.lock().catchpoints.add(class_name);
        info!("catchpoint set for {}", class_name);
        Ok(())
    }

    pub fn remove_catchpoint(&self, class_name: &str) -> Result<()> {
        self.ensure_started()?;
        self.session.shared.lock().catchpoints.remove(class_name)
    }

    pub fn enable_catchpoint(&self, class_name: &str) -> Result<()> {
        self.ensure_started()?;
        self.session
            .shared
            .lock()
            .catchpoints
            .set_enabled(class_name, true)
    }

    pub fn disable_catchpoint(&self, class_name: &str) -> Result<()> {
        self.ensure_started()?;
        self.session
            .shared
            .lock()
            .catchpoints
            .set_enabled(class_name, false)
    }

    /// クラス名 → ヒット回数（追加順）
    pub fn catchpoints(&self) -> IndexMap<String, usize> {
        self.session.shared.lock().catchpoints.snapshot()
    }

    /// クラス名順のキャッチポイント
    pub fn catchpoints_sorted(&self) -> Vec<(String, usize)> {
        self.session.shared.lock().catchpoints.sorted()
    }

    /// 次に送出される例外をキャッチポイントと照合しない
    pub fn skip_next_exception(&self) {
        self.session.skip_next_exception.store(true, Ordering::SeqCst);
    }

    // ---- 設定 ----

    pub fn post_mortem(&self) -> bool {
        self.session.post_mortem()
    }

    pub fn set_post_mortem(&self, enabled: bool) {
        self.session.post_mortem.store(enabled, Ordering::SeqCst);
    }

    pub fn tracing(&self) -> bool {
        self.session.tracing.load(Ordering::SeqCst)
    }

    /// 全スレッドの行トレースを切り替える
    pub fn set_tracing(&self, enabled: bool) {
        self.session.tracing.store(enabled, Ordering::SeqCst);
    }

    /// コンテキスト単位の行トレースを切り替える
    pub fn set_context_tracing(&self, id: ContextId, enabled: bool) -> Result<()> {
        self.context(id)?.state().tracing = enabled;
        Ok(())
    }

    /// デバッガ自身のスレッドを登録する（そのスレッドのイベントは常に無視）
    pub fn ignore_thread(&self, tid: Tid) {
        self.session.shared.lock().registry.ignore_thread(tid);
    }

    // ---- コンテキスト ----

    /// 全コンテキスト（作成順、デバッガ自身のスレッドを除く）
    pub fn contexts(&self) -> Vec<ContextInfo> {
        let contexts = self.session.shared.lock().registry.list();
        contexts
            .iter()
            .filter(|ctx| !ctx.is_internal())
            .map(|ctx| ctx.info())
            .collect()
    }

    pub fn context_info(&self, id: ContextId) -> Result<ContextInfo> {
        Ok(self.context(id)?.info())
    }

    /// スレッドの生存中のコンテキスト
    pub fn context_for(&self, tid: Tid) -> Option<ContextInfo> {
        let ctx = self.session.shared.lock().registry.lookup(tid)?;
        Some(ctx.info())
    }

    /// 最も新しく停止し、コマンドを待っているコンテキスト
    pub fn current_context(&self) -> Option<ContextInfo> {
        let contexts = self.session.shared.lock().registry.list();
        contexts
            .iter()
            .filter_map(|ctx| {
                let state = ctx.state();
                state.suspended.then_some((state.suspend_seq, ctx))
            })
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, ctx)| ctx.info())
    }

    /// 最後に停止したコンテキスト（再開済みでもよい）
    pub fn last_context(&self) -> Option<ContextInfo> {
        let ctx = {
            let shared = self.session.shared.lock();
            let id = shared.last_context?;
            shared.registry.get(id).ok()?
        };
        Some(ctx.info())
    }

    /// 停止理由
    pub fn stop_reason(&self, id: ContextId) -> Result<StopReason> {
        Ok(self.context(id)?.state().stop_reason.clone())
    }

    /// 終了済みのコンテキストを回収する
    pub fn detach(&self, id: ContextId) -> Result<()> {
        let ctx = self.context(id)?;
        if !ctx.is_dead() {
            return Err(DebugError::InvalidCommand(format!(
                "context {} is still alive",
                id
            )));
        }
        self.session.shared.lock().registry.remove(id)?;
        debug!("context {} detached", id);
        Ok(())
    }

    /// 実行中のコンテキストに次の行での停止を要求する
    ///
    /// 終了済みまたは既に停止中の場合は false。
    pub fn pause(&self, id: ContextId) -> Result<bool> {
        let ctx = self.context(id)?;
        let mut state = ctx.state();
        if state.dead || state.suspended {
            return Ok(false);
        }
        state.pause_requested = true;
        Ok(true)
    }

    // ---- 実行制御 ----

    /// 再開する
    pub fn resume(&self, id: ContextId) -> Result<()> {
        self.command(id, |_| Ok(()))
    }

    /// 指定の粒度で1ステップ実行する
    pub fn step(&self, id: ContextId, mode: StepMode) -> Result<()> {
        match mode {
            StepMode::Into => self.step_into(id, 1, false),
            StepMode::Over => self.step_over(id, 1, 0),
            StepMode::Out => self.finish(id, 0),
        }
    }

    /// `count` 行進んだところで停止する
    pub fn step_into(&self, id: ContextId, count: usize, force: bool) -> Result<()> {
        self.command(id, |state| {
            let (file, line) = state.position().unwrap_or_default();
            let file = self.session.normalize(&file);
            state.step.step_into(count, force, &file, line);
            Ok(())
        })
    }

    /// フレーム `frame` の深さで `count` 行進んだところで停止する
    pub fn step_over(&self, id: ContextId, count: usize, frame: usize) -> Result<()> {
        self.command(id, |state| {
            let depth = target_depth(state, frame)?;
            state.step.step_over(depth, count);
            Ok(())
        })
    }

    /// フレーム `frame` から抜けたところで停止する
    pub fn finish(&self, id: ContextId, frame: usize) -> Result<()> {
        self.command(id, |state| {
            let depth = target_depth(state, frame)?;
            state.step.step_out(depth);
            Ok(())
        })
    }

    /// 現在のファイルの指定行まで実行する
    pub fn continue_to(&self, id: ContextId, line: u32) -> Result<()> {
        let ctx = self.context(id)?;
        let position = ctx.state().position();
        let (file, _) = position.ok_or_else(|| {
            DebugError::InvalidCommand(format!("context {} has no current position", id))
        })?;
        let file = self.session.normalize(&file);

        if let Some(table) = self.session.shared.lock().sources.get(&file) {
            if !table.is_executable(line) {
                return Err(DebugError::Location { file, line });
            }
        }

        self.command(id, |state| {
            state.step.continue_to(&file, line);
            Ok(())
        })
    }

    /// 停止中のフレームの次に実行する行を変更して再開する
    ///
    /// 失敗した場合は何も変更せず、コンテキストは停止したまま。
    /// 成功すると変更先の行で `jump` として再び停止する。
    pub fn jump(&self, id: ContextId, line: u32) -> Result<()> {
        let ctx = self.context(id)?;
        let (file, from_line, depth) = {
            let state = ctx.state();
            if state.dead {
                return Err(DebugError::DeadContext(id));
            }
            if !state.suspended {
                return Err(DebugError::NotStopped(id));
            }
            if state.last_event != Some(EventKind::Line) {
                return Err(DebugError::Jump(
                    "not stopped at a statement boundary".to_string(),
                ));
            }
            let (file, from_line) = state
                .position()
                .ok_or_else(|| DebugError::Jump("no current position".to_string()))?;
            (file, from_line, state.frames.depth())
        };

        if let Some(table) = self.session.shared.lock().sources.get(&file) {
            table
                .check_jump(from_line, line)
                .map_err(|violation| DebugError::Jump(violation.to_string()))?;
        }

        let request = JumpRequest {
            file,
            from_line,
            to_line: line,
            depth,
        };
        self.session
            .host
            .set_next_statement(ctx.tid(), &request)
            .map_err(|e| DebugError::Jump(e.to_string()))?;

        info!("context {} jumps from line {} to {}", id, from_line, line);
        self.command(id, |state| {
            state.frames.set_top_line(line);
            state.last_line = line;
            state.pending_jump = true;
            state.step.cancel();
            Ok(())
        })
    }

    /// 制御コマンドを実行する
    pub fn execute(&self, id: ContextId, command: Command) -> Result<()> {
        match command {
            Command::Continue => self.resume(id),
            Command::Step { count, force } => self.step_into(id, count, force),
            Command::Next { count } => self.step_over(id, count, 0),
            Command::Finish { frame } => self.finish(id, frame),
            Command::Jump { line } => self.jump(id, line),
            Command::Until { line } => self.continue_to(id, line),
        }
    }

    // ---- フレーム ----

    /// スタックの深さ
    pub fn stack_size(&self, id: ContextId) -> Result<usize> {
        self.inspect(id, |state| Ok(state.frames.depth()))
    }

    /// フレーム `index` のスコープチェーン
    pub fn frame_binding(&self, id: ContextId, index: usize) -> Result<Binding> {
        self.inspect(id, |state| {
            state
                .frames
                .binding(index)
                .cloned()
                .ok_or(DebugError::FrameIndex {
                    index,
                    depth: state.frames.depth(),
                })
        })
    }

    /// フレームの要約
    pub fn frame_info(&self, id: ContextId, index: usize) -> Result<FrameInfo> {
        self.inspect(id, |state| {
            state
                .frames
                .get(index)
                .map(|frame| FrameInfo::from_frame(index, frame))
                .ok_or(DebugError::FrameIndex {
                    index,
                    depth: state.frames.depth(),
                })
        })
    }

    /// 内側から順に全フレームの要約
    pub fn backtrace(&self, id: ContextId) -> Result<Vec<FrameInfo>> {
        self.inspect(id, |state| {
            Ok(state
                .frames
                .iter()
                .enumerate()
                .map(|(index, frame)| FrameInfo::from_frame(index, frame))
                .collect())
        })
    }

    /// フレームから見えるローカル変数（内側のスコープ優先）
    pub fn frame_locals(&self, id: ContextId, index: usize) -> Result<Vec<(String, Value)>> {
        Ok(self.frame_binding(id, index)?.locals())
    }

    /// フレームの引数と現在値
    pub fn frame_args(&self, id: ContextId, index: usize) -> Result<Vec<(String, Option<Value>)>> {
        self.inspect(id, |state| {
            let frame = state.frames.get(index).ok_or(DebugError::FrameIndex {
                index,
                depth: state.frames.depth(),
            })?;
            Ok(frame
                .args
                .iter()
                .map(|name| (name.clone(), frame.binding.get(name)))
                .collect())
        })
    }

    /// フレームのスコープで式を評価する
    pub fn evaluate(&self, id: ContextId, index: usize, expr: &str) -> Result<Value> {
        let binding = self.frame_binding(id, index)?;
        let ctx = self.context(id)?;
        ConditionEvaluator::new(self.session.host.as_ref())
            .evaluate(&ctx, expr, &binding)
            .map_err(DebugError::from)
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// フレーム `frame` を基準にしたステップの目標の深さ
fn target_depth(state: &ContextState, frame: usize) -> Result<usize> {
    let depth = state.frames.depth();
    if frame > 0 && frame >= depth {
        return Err(DebugError::FrameIndex {
            index: frame,
            depth,
        });
    }
    Ok(depth - frame)
}
