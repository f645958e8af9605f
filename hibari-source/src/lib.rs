//! Hibari ソース情報
//!
//! このクレートは、デバッグ対象スクリプトのソース側の知識を提供します。
//! 実行可能な文の行、メソッドの範囲、rescue/ensure/ブロックの領域を保持し、
//! ブレークポイント位置の検証とjump先の検証に使用します。

pub mod index;
pub mod lines;
pub mod path;

pub use index::SourceIndex;
pub use lines::{JumpViolation, LineTable, MethodRange, Region, RegionKind};
pub use path::normalize_path;
