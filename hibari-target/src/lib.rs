//! Hibari ホストインタプリタとの境界
//!
//! このクレートは、デバッグ対象のインタプリタ（ホスト）とデバッガの間の契約を定義します。
//! 正規化された実行イベント、スレッドID、スコープチェーン（Binding）、
//! ホストが提供する能力（式の評価・次に実行する文の変更）などを扱います。
//! `mock` モジュールはテスト用の決定的なインメモリインタプリタです。

pub mod binding;
pub mod event;
pub mod host;
pub mod mock;
pub mod thread;

pub use binding::{Binding, ScopeKind, Value};
pub use event::{EventKind, ExceptionInfo, ExecEvent};
pub use host::{EventSink, Host, JumpRequest};
pub use thread::Tid;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
