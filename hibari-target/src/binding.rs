//! 値とスコープチェーン

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// ホストの値
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    /// 上記以外のオブジェクト（クラス名と識別子のみ）
    Object { class: String, id: u64 },
}

impl Value {
    /// 真偽値として評価する（nil と false のみ偽）
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// クラス名を取得する
    pub fn class_name(&self) -> &str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool(true) => "TrueClass",
            Value::Bool(false) => "FalseClass",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Symbol(_) => "Symbol",
            Value::Object { class, .. } => class,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Object { class, id } => write!(f, "#<{}:0x{:x}>", class, id),
        }
    }
}

/// スコープの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// メソッド本体（チェーンの根）
    Method,
    /// ブロック本体（外側のスコープを参照できる）
    Block,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    vars: RwLock<IndexMap<String, Value>>,
    parent: Option<Arc<Scope>>,
}

/// フレームのスコープチェーン
///
/// ブロックローカル → 外側のブロック → メソッドローカルの順に名前を解決します。
/// チェーンはメソッドスコープで終わり、呼び出し元やグローバルには到達しません。
/// クローンは同じスコープを共有します。
#[derive(Debug, Clone)]
pub struct Binding {
    scope: Arc<Scope>,
}

impl Binding {
    /// メソッドスコープを作成する
    pub fn method() -> Self {
        Self {
            scope: Arc::new(Scope {
                kind: ScopeKind::Method,
                vars: RwLock::new(IndexMap::new()),
                parent: None,
            }),
        }
    }

    /// このスコープを外側に持つブロックスコープを作成する
    pub fn block(&self) -> Self {
        Self {
            scope: Arc::new(Scope {
                kind: ScopeKind::Block,
                vars: RwLock::new(IndexMap::new()),
                parent: Some(self.scope.clone()),
            }),
        }
    }

    /// 最も内側のスコープの種類
    pub fn kind(&self) -> ScopeKind {
        self.scope.kind
    }

    /// チェーンの長さ
    pub fn depth(&self) -> usize {
        self.scopes().count()
    }

    fn scopes(&self) -> impl Iterator<Item = &Scope> + '_ {
        std::iter::successors(Some(self.scope.as_ref()), |s| {
            let scope: &Scope = *s;
            scope.parent.as_deref()
        })
    }

    /// 名前がチェーン上で定義されているか
    pub fn has(&self, name: &str) -> bool {
        self.scopes().any(|s| s.vars.read().contains_key(name))
    }

    /// 名前を解決する
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scopes().find_map(|s| s.vars.read().get(name).cloned())
    }

    /// 代入する
    ///
    /// 既に定義されているスコープがあればそこを更新し、
    /// なければ最も内側のスコープに定義する。
    pub fn set(&self, name: &str, value: Value) {
        for scope in self.scopes() {
            let mut vars = scope.vars.write();
            if let Some(slot) = vars.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.define(name, value);
    }

    /// 最も内側のスコープに定義する（ブロック引数など）
    pub fn define(&self, name: &str, value: Value) {
        self.scope.vars.write().insert(name.to_string(), value);
    }

    /// 可視なローカル変数（内側優先、重複なし）
    pub fn locals(&self) -> Vec<(String, Value)> {
        let mut seen = IndexMap::new();
        for scope in self.scopes() {
            for (name, value) in scope.vars.read().iter() {
                seen.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        seen.into_iter().collect()
    }

    /// 可視なローカル変数名
    pub fn local_names(&self) -> Vec<String> {
        self.locals().into_iter().map(|(name, _)| name).collect()
    }

    /// 同じスコープを指しているか
    pub fn ptr_eq(&self, other: &Binding) -> bool {
        Arc::ptr_eq(&self.scope, &other.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sees_enclosing_method() {
        let method = Binding::method();
        method.set("s2_var1", Value::Int(456));

        let block = method.block();
        block.define("i", Value::Int(0));
        block.set("j", Value::Int(0));

        assert!(block.has("s2_var1"));
        assert_eq!(block.get("i"), Some(Value::Int(0)));
        assert_eq!(block.depth(), 2);

        // ブロックローカルはメソッド側からは見えない
        assert!(!method.has("i"));
        assert!(!method.has("j"));
    }

    #[test]
    fn test_set_updates_defining_scope() {
        let method = Binding::method();
        method.set("x", Value::Int(1));
        let block = method.block();
        block.set("x", Value::Int(2));
        assert_eq!(method.get("x"), Some(Value::Int(2)));
        assert_eq!(block.local_names(), vec!["x".to_string()]);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert_eq!(Value::Str("a".into()).class_name(), "String");
    }
}
