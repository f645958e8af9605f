//! 統合テスト用の共通ヘルパー

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use hibari_core::{ChannelListener, ContextId, DebugEvent, Debugger, DebuggerConfig, StopReason};
use hibari_target::mock::{MockInterpreter, Program, RunOutcome};
use hibari_target::Tid;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// テスト用の基準ディレクトリ
pub const BASE_DIR: &str = "/work";

const TIMEOUT: Duration = Duration::from_secs(10);

/// `RUST_LOG` に従ってログを出力する
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// デバッガとインメモリインタプリタとコントローラ側の受信チャネル
pub struct Harness {
    pub debugger: Debugger,
    pub interp: MockInterpreter,
    pub events: Receiver<DebugEvent>,
}

impl Harness {
    /// 行テーブルを登録した状態で開始する
    pub fn new(program: Program) -> Self {
        Self::with_config(program, DebuggerConfig::new().with_base_dir(BASE_DIR))
    }

    pub fn with_config(program: Program, config: DebuggerConfig) -> Self {
        let harness = Self::unregistered(program, config);
        harness
            .debugger
            .register_source(harness.interp.program().line_table());
        harness
    }

    /// 行テーブルを登録せずに開始する
    pub fn unregistered(program: Program, config: DebuggerConfig) -> Self {
        init_tracing();
        let interp = MockInterpreter::new(program);
        let debugger =
            Debugger::start(Arc::new(interp.clone()), config).expect("failed to start debugger");
        let (listener, events) = ChannelListener::new();
        debugger.add_listener(Arc::new(listener));
        Self {
            debugger,
            interp,
            events,
        }
    }

    /// プログラムを別スレッドで実行する
    pub fn spawn(&self, tid: u64) -> JoinHandle<RunOutcome> {
        self.interp.spawn(Tid(tid))
    }

    pub fn next_event(&self) -> DebugEvent {
        self.events
            .recv_timeout(TIMEOUT)
            .expect("timed out waiting for a debug event")
    }

    /// 次の停止通知を待つ
    pub fn wait_suspended(&self) -> (ContextId, StopReason) {
        loop {
            match self.next_event() {
                DebugEvent::Suspended { context, reason } => return (context, reason),
                DebugEvent::ThreadExited { context } => {
                    panic!("context {} exited before suspending", context)
                }
                _ => {}
            }
        }
    }

    /// 次のスレッド終了通知を待つ（途中で停止したら失敗）
    pub fn wait_exit(&self) -> ContextId {
        loop {
            match self.next_event() {
                DebugEvent::ThreadExited { context } => return context,
                DebugEvent::Suspended { context, reason } => {
                    panic!("context {} unexpectedly suspended: {}", context, reason)
                }
                _ => {}
            }
        }
    }

    /// スレッドの終了を待って結果を返す
    pub fn join(&self, handle: JoinHandle<RunOutcome>) -> RunOutcome {
        handle.join().expect("interpreter thread panicked")
    }
}
