//! Hibari 呼び出しスタックモデル
//!
//! このクレートは、スレッドごとの呼び出しスタック（フレームの並び）を扱います。
//! 実行イベントに従ってフレームを積み降ろしし、停止中のフレームの
//! スコープチェーンを参照できるようにします。

pub mod frame;
pub mod frame_stack;

pub use frame::Frame;
pub use frame_stack::FrameStack;
