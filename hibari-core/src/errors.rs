//! デバッガのエラー

use thiserror::Error;

/// 制御APIが返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    /// ブレークポイント位置が実行可能な行に解決できない
    #[error("{file}:{line} is not an executable line")]
    Location { file: String, line: u32 },

    /// 未知のブレークポイント・キャッチポイント・コンテキスト
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// フレームインデックスがスタックの深さ以上
    #[error("Frame index {index} out of range (stack depth {depth})")]
    FrameIndex { index: usize, depth: usize },

    /// 実行中のコンテキストへの問い合わせ
    #[error("Context {0} is not stopped")]
    NotStopped(usize),

    /// jump先が不正（実行状態は変更されていない）
    #[error("Cannot jump: {0}")]
    Jump(String),

    /// 終了したコンテキストへの実行制御
    #[error("Context {0} is dead")]
    DeadContext(usize),

    /// `stop()` 後の制御呼び出し
    #[error("Debugger is not started")]
    NotStarted,

    /// 解釈できないコマンドや位置指定
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// ホストの能力呼び出しの失敗
    #[error("Host error: {0}")]
    Host(String),
}

impl DebugError {
    pub(crate) fn breakpoint_not_found(id: usize) -> Self {
        DebugError::NotFound {
            kind: "Breakpoint",
            name: id.to_string(),
        }
    }

    pub(crate) fn catchpoint_not_found(name: &str) -> Self {
        DebugError::NotFound {
            kind: "Catchpoint",
            name: name.to_string(),
        }
    }

    pub(crate) fn context_not_found(id: usize) -> Self {
        DebugError::NotFound {
            kind: "Context",
            name: id.to_string(),
        }
    }
}

impl From<anyhow::Error> for DebugError {
    fn from(err: anyhow::Error) -> Self {
        DebugError::Host(err.to_string())
    }
}
