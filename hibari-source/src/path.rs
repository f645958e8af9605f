//! パス正規化のユーティリティ関数

use std::path::{Component, Path, PathBuf};

/// パスを `base` 基準の絶対パスに字句的に正規化する
///
/// `.` は取り除き、`..` は直前の要素を打ち消します。
/// ファイルシステムにはアクセスしません（シンボリックリンクは解決しない）。
///
/// # Examples
/// ```
/// use hibari_source::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// let base = Path::new("/work");
/// assert_eq!(normalize_path(base, "lib/../app.rb"), PathBuf::from("/work/app.rb"));
/// assert_eq!(normalize_path(base, "/tmp/./x.rb"), PathBuf::from("/tmp/x.rb"));
/// ```
pub fn normalize_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // ルートより上には出ない
                if !normalized.pop() && !normalized.has_root() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
