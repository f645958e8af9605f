//! Hibari デバッガのコア機能
//!
//! このクレートは、ホストインタプリタの実行イベント列をスレッドごとの呼び出しスタックに
//! 組み立て、ブレークポイント・キャッチポイント・ステップ実行と照合して
//! スレッドの停止と再開を制御します。
//! コントローラ（UI）は `Debugger` を通して操作し、`DebugListener` で通知を受け取ります。

pub mod breakpoint;
pub mod catchpoint;
pub mod command;
pub mod condition;
pub mod config;
pub mod context;
pub mod debugger;
pub mod dispatcher;
pub mod errors;
pub mod listener;
pub mod parse;
pub mod registry;
pub mod stepping;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointTable, HitCondition, Location};
pub use catchpoint::{Catchpoint, CatchpointTable};
pub use command::Command;
pub use config::DebuggerConfig;
pub use context::{Context, ContextId, ContextInfo, FrameInfo, StopReason};
pub use debugger::Debugger;
pub use errors::DebugError;
pub use listener::{ChannelListener, DebugEvent, DebugListener};
pub use registry::ContextRegistry;
pub use stepping::{StepController, StepMode, StepState};

// 他のクレートから使用するために再エクスポート
pub use hibari_source::LineTable;
pub use hibari_stack::{Frame, FrameStack};
pub use hibari_target::{Binding, Host, Tid, Value};

/// デバッガの結果型
pub type Result<T> = std::result::Result<T, DebugError>;
