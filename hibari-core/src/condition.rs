//! 条件式の評価
//!
//! 式の評価そのものはホストに委ね、評価中に発生する実行イベントで
//! ディスパッチャへ再入しないようにコンテキストを無視状態にします。

use crate::Context;
use hibari_target::{Binding, Host, Value};
use tracing::warn;

/// フレームのスコープで式を評価する
pub struct ConditionEvaluator<'a> {
    host: &'a dyn Host,
}

impl<'a> ConditionEvaluator<'a> {
    /// 新しい評価器を作成する
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    /// 式を評価する
    pub fn evaluate(&self, ctx: &Context, expr: &str, binding: &Binding) -> anyhow::Result<Value> {
        let _guard = ctx.ignore_guard();
        self.host.evaluate(ctx.tid(), expr, binding)
    }

    /// ブレークポイント条件が成立するか
    ///
    /// 評価に失敗した場合は不成立として扱う。
    pub fn holds(&self, ctx: &Context, expr: &str, binding: &Binding) -> bool {
        match self.evaluate(ctx, expr, binding) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                warn!(
                    "condition '{}' failed in context {}: {}; treated as false",
                    expr,
                    ctx.id(),
                    e
                );
                false
            }
        }
    }
}
