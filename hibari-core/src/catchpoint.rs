//! キャッチポイント管理

use crate::{DebugError, Result};
use indexmap::IndexMap;

/// キャッチポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catchpoint {
    pub hit_count: usize,
    pub enabled: bool,
}

/// キャッチポイントテーブル
///
/// 例外クラス名（文字列そのまま）をキーに、追加順を保持します。
#[derive(Debug, Default)]
pub struct CatchpointTable {
    entries: IndexMap<String, Catchpoint>,
}

impl CatchpointTable {
    /// 新しいキャッチポイントテーブルを作成する
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// キャッチポイントを追加する
    ///
    /// 既に存在する場合は何もしない（ヒット回数は保持される）。
    pub fn add(&mut self, class_name: &str) {
        self.entries
            .entry(class_name.to_string())
            .or_insert(Catchpoint {
                hit_count: 0,
                enabled: true,
            });
    }

    /// キャッチポイントを削除する
    pub fn remove(&mut self, class_name: &str) -> Result<()> {
        self.entries
            .shift_remove(class_name)
            .map(|_| ())
            .ok_or_else(|| DebugError::catchpoint_not_found(class_name))
    }

    /// 有効／無効を切り替える
    pub fn set_enabled(&mut self, class_name: &str, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(class_name)
            .ok_or_else(|| DebugError::catchpoint_not_found(class_name))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// キャッチポイントを取得する
    pub fn get(&self, class_name: &str) -> Option<&Catchpoint> {
        self.entries.get(class_name)
    }

    /// クラス名 → ヒット回数（追加順）
    pub fn snapshot(&self) -> IndexMap<String, usize> {
        self.entries
            .iter()
            .map(|(name, cp)| (name.clone(), cp.hit_count))
            .collect()
    }

    /// クラス名順の一覧
    pub fn sorted(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<_> = self.snapshot().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 全て削除する
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 送出された例外の祖先チェーンと照合する
    ///
    /// 最も派生したクラスから順に調べ、最初に一致した有効なエントリの
    /// ヒット回数を増やしてその名前を返す。
    pub fn match_chain(&mut self, class_chain: &[String]) -> Option<String> {
        for class in class_chain {
            if let Some(entry) = self.entries.get_mut(class) {
                if entry.enabled {
                    entry.hit_count += 1;
                    return Some(class.clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut table = CatchpointTable::new();
        assert!(table.snapshot().is_empty());

        table.add("ZeroDivisionError");
        assert_eq!(
            table.snapshot().into_iter().collect::<Vec<_>>(),
            vec![("ZeroDivisionError".to_string(), 0)]
        );

        table.match_chain(&chain(&["ZeroDivisionError", "StandardError"]));
        table.add("ZeroDivisionError");
        table.add("RuntimeError");

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["ZeroDivisionError"], 1);
        assert_eq!(snapshot["RuntimeError"], 0);

        let keys: Vec<_> = table.sorted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["RuntimeError", "ZeroDivisionError"]);
    }

    #[test]
    fn test_ancestor_chain_first_hit_wins() {
        let mut table = CatchpointTable::new();
        table.add("StandardError");
        table.add("ZeroDivisionError");

        let raised = chain(&["ZeroDivisionError", "StandardError", "Exception"]);
        assert_eq!(table.match_chain(&raised).as_deref(), Some("ZeroDivisionError"));
        assert_eq!(table.get("StandardError").unwrap().hit_count, 0);

        table.set_enabled("ZeroDivisionError", false).unwrap();
        assert_eq!(table.match_chain(&raised).as_deref(), Some("StandardError"));

        assert!(table.match_chain(&chain(&["Interrupt", "Exception"])).is_none());
    }

    #[test]
    fn test_remove() {
        let mut table = CatchpointTable::new();
        table.add("RuntimeError");
        table.remove("RuntimeError").unwrap();
        assert!(table.is_empty());
        assert!(matches!(
            table.remove("RuntimeError"),
            Err(DebugError::NotFound { .. })
        ));
    }
}
