//! コントローラへの通知

use crate::{ContextId, StopReason};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

/// デバッグ通知の受け口
///
/// 通知はデバッガ内部のロックを保持せずに、イベントを発生させたスレッド
/// またはコマンドを発行したスレッド上で呼び出されます。
pub trait DebugListener: Send + Sync {
    /// コンテキストが停止した
    fn on_suspend(&self, _context: ContextId, _reason: &StopReason) {}

    /// コンテキストが再開した
    fn on_resume(&self, _context: ContextId) {}

    /// スレッドが終了した
    fn on_thread_exit(&self, _context: ContextId) {}

    /// トレース対象の行が実行された
    fn on_trace(&self, _context: ContextId, _file: &str, _line: u32) {}
}

/// チャネルで送られる通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Suspended { context: ContextId, reason: StopReason },
    Resumed { context: ContextId },
    ThreadExited { context: ContextId },
    Trace { context: ContextId, file: String, line: u32 },
}

/// 通知をチャネルに転送するリスナー
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: Sender<DebugEvent>,
}

impl ChannelListener {
    /// リスナーと受信側を作成する
    pub fn new() -> (Self, Receiver<DebugEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: DebugEvent) {
        if self.sender.send(event).is_err() {
            trace!("debug event dropped: receiver disconnected");
        }
    }
}

impl DebugListener for ChannelListener {
    fn on_suspend(&self, context: ContextId, reason: &StopReason) {
        self.send(DebugEvent::Suspended {
            context,
            reason: reason.clone(),
        });
    }

    fn on_resume(&self, context: ContextId) {
        self.send(DebugEvent::Resumed { context });
    }

    fn on_thread_exit(&self, context: ContextId) {
        self.send(DebugEvent::ThreadExited { context });
    }

    fn on_trace(&self, context: ContextId, file: &str, line: u32) {
        self.send(DebugEvent::Trace {
            context,
            file: file.to_string(),
            line,
        });
    }
}
