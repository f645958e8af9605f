//! ファイルごとの行テーブルの登録と検索

use crate::{normalize_path, LineTable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// ソースインデックス
///
/// 正規化済みの絶対パスをキーに行テーブルを保持します。
/// 登録されていないファイルについては何も判断しません。
#[derive(Debug, Clone)]
pub struct SourceIndex {
    /// 相対パスの基準ディレクトリ
    base_dir: PathBuf,
    /// 正規化パス -> 行テーブル
    tables: HashMap<PathBuf, LineTable>,
}

impl SourceIndex {
    /// 新しいソースインデックスを作成する
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tables: HashMap::new(),
        }
    }

    /// 基準ディレクトリを取得する
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// パスを基準ディレクトリに対して正規化する
    pub fn normalize(&self, file: &str) -> PathBuf {
        normalize_path(&self.base_dir, file)
    }

    /// 行テーブルを登録する（同じファイルは置き換え）
    pub fn register(&mut self, table: LineTable) {
        let key = self.normalize(table.file());
        debug!("registering line table for {}", key.display());
        self.tables.insert(key, table);
    }

    /// ファイルの行テーブルを取得する
    pub fn get(&self, file: &str) -> Option<&LineTable> {
        self.tables.get(&self.normalize(file))
    }

    /// 登録済みファイル数
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// 登録済みファイルがないかどうか
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
