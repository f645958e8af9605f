//! ホストが提供する能力

use crate::{Binding, ExecEvent, Result, Tid, Value};
use std::sync::Arc;

/// イベントの受け口
///
/// ホストは実行イベントが発生したスレッド上で同期的に `on_event` を呼び出します。
/// 呼び出しはデバッガがスレッドを停止させている間ブロックします。
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: ExecEvent);
}

/// jump要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpRequest {
    /// 対象フレームのファイル
    pub file: String,
    /// 対象フレームの現在行
    pub from_line: u32,
    /// 次に実行する行
    pub to_line: u32,
    /// 対象フレームのスタック深さ（最内フレームを含む）
    pub depth: usize,
}

/// デバッグ対象のインタプリタ
///
/// デバッガがホストに要求するのは、フックの着脱と
/// 「スコープ内での式の評価」「次に実行する文の変更」の二つの能力のみです。
pub trait Host: Send + Sync {
    /// 実行イベントのフックを設定する
    fn install_hooks(&self, sink: Arc<dyn EventSink>) -> Result<()>;

    /// 実行イベントのフックを解除する
    fn remove_hooks(&self);

    /// `binding` のスコープで式を評価する
    ///
    /// 評価は `tid` のスレッド上で行われることがあり、その間に発生したイベントは
    /// デバッガ側で無視されます。
    fn evaluate(&self, tid: Tid, expr: &str, binding: &Binding) -> Result<Value>;

    /// 停止中のフレームの次に実行する文を変更する
    ///
    /// 失敗した場合、実行状態は一切変更されていてはならない。
    fn set_next_statement(&self, tid: Tid, request: &JumpRequest) -> Result<()>;
}
