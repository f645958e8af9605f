//! コンテキストの登録と検索

use crate::{Context, ContextId, DebugError, Result};
use hibari_target::{ExceptionInfo, Tid};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// コンテキストレジストリ
///
/// 生存中のコンテキストはスレッドIDごとに高々一つです。
/// 終了したコンテキストはスレッドIDとの対応を外したうえで、明示的に
/// 回収されるまで作成順の一覧に残ります。
#[derive(Debug)]
pub struct ContextRegistry {
    contexts: IndexMap<ContextId, Arc<Context>>,
    /// 生存中のコンテキストのみ
    by_tid: HashMap<Tid, ContextId>,
    /// デバッガ自身のスレッド
    internal_tids: HashSet<Tid>,
    next_id: ContextId,
}

impl ContextRegistry {
    /// 新しいレジストリを作成する
    pub fn new() -> Self {
        Self {
            contexts: IndexMap::new(),
            by_tid: HashMap::new(),
            internal_tids: HashSet::new(),
            next_id: 1,
        }
    }

    /// スレッドのコンテキストを取得し、なければ作成する
    pub fn get_or_create(&mut self, tid: Tid) -> Arc<Context> {
        if let Some(ctx) = self.lookup(tid) {
            return ctx;
        }

        let id = self.next_id;
        self.next_id += 1;

        let internal = self.internal_tids.contains(&tid);
        let ctx = Arc::new(Context::new(id, tid, internal));
        debug!("created context {} for {} (internal: {})", id, tid, internal);

        self.contexts.insert(id, ctx.clone());
        self.by_tid.insert(tid, id);
        ctx
    }

    /// スレッドの生存中のコンテキストを検索する
    pub fn lookup(&self, tid: Tid) -> Option<Arc<Context>> {
        let id = self.by_tid.get(&tid)?;
        self.contexts.get(id).cloned()
    }

    /// IDでコンテキストを取得する
    pub fn get(&self, id: ContextId) -> Result<Arc<Context>> {
        self.contexts
            .get(&id)
            .cloned()
            .ok_or_else(|| DebugError::context_not_found(id))
    }

    /// スレッドのコンテキストを終了済みにする
    ///
    /// コンテキストは削除せず、スタックを凍結したスナップショットにする。
    pub fn mark_dead(&mut self, tid: Tid, uncaught: Option<ExceptionInfo>) -> Option<Arc<Context>> {
        let id = self.by_tid.remove(&tid)?;
        let ctx = self.contexts.get(&id)?.clone();
        ctx.mark_dead(uncaught);
        debug!("context {} for {} is dead", id, tid);
        Some(ctx)
    }

    /// コンテキストを回収する
    pub fn remove(&mut self, id: ContextId) -> Result<Arc<Context>> {
        let ctx = self
            .contexts
            .shift_remove(&id)
            .ok_or_else(|| DebugError::context_not_found(id))?;
        if self.by_tid.get(&ctx.tid()) == Some(&id) {
            self.by_tid.remove(&ctx.tid());
        }
        Ok(ctx)
    }

    /// 作成順の一覧
    pub fn list(&self) -> Vec<Arc<Context>> {
        self.contexts.values().cloned().collect()
    }

    /// スレッドをデバッガ自身のものとして登録する
    ///
    /// 既に生存中のコンテキストがあれば、それも内部扱いにする。
    pub fn ignore_thread(&mut self, tid: Tid) {
        self.internal_tids.insert(tid);
        if let Some(ctx) = self.lookup(tid) {
            ctx.mark_internal();
            debug!("context {} for {} is now internal", ctx.id(), tid);
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// 全て削除する
    pub fn clear(&mut self) {
        self.contexts.clear();
        self.by_tid.clear();
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_context_per_thread() {
        let mut registry = ContextRegistry::new();
        let a = registry.get_or_create(Tid(10));
        let b = registry.get_or_create(Tid(11));
        let again = registry.get_or_create(Tid(10));

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup(Tid(12)).is_none());
        assert!(matches!(registry.get(9), Err(DebugError::NotFound { .. })));
    }

    #[test]
    fn test_dead_context_is_kept_until_removed() {
        let mut registry = ContextRegistry::new();
        let first = registry.get_or_create(Tid(10));
        registry.mark_dead(Tid(10), None).unwrap();

        assert!(first.is_dead());
        assert!(registry.lookup(Tid(10)).is_none());
        assert_eq!(registry.list().len(), 1);

        // 同じスレッドIDの新しいスレッドには新しいコンテキスト
        let second = registry.get_or_create(Tid(10));
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        registry.remove(first.id()).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert!(registry.lookup(Tid(10)).is_some());
    }

    #[test]
    fn test_internal_threads() {
        let mut registry = ContextRegistry::new();
        registry.ignore_thread(Tid(99));
        assert!(registry.get_or_create(Tid(99)).is_internal());
        assert!(!registry.get_or_create(Tid(1)).is_internal());
    }

    #[test]
    fn test_ignore_thread_with_existing_context() {
        let mut registry = ContextRegistry::new();
        let ctx = registry.get_or_create(Tid(5));
        assert!(!ctx.is_ignored());

        registry.ignore_thread(Tid(5));
        assert!(ctx.is_internal());
        assert!(ctx.is_ignored());
        assert!(Arc::ptr_eq(&ctx, &registry.get_or_create(Tid(5))));
    }
}
