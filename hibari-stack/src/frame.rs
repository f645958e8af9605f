//! 活性レコード

use hibari_target::{Binding, ExecEvent, Value};

/// フレーム（メソッドまたはブロックの活性レコード）
#[derive(Debug, Clone)]
pub struct Frame {
    /// ソースファイル
    pub file: String,
    /// 現在行
    pub line: u32,
    /// メソッド名
    pub method: Option<String>,
    /// クラス名
    pub class: Option<String>,
    /// このフレームのスコープチェーン
    pub binding: Binding,
    /// ブロックフレームかどうか
    pub is_block: bool,
    /// 引数名
    pub args: Vec<String>,
    /// 戻り値（復帰イベントでのみ設定される）
    pub return_value: Option<Value>,
}

impl Frame {
    /// フレームを作成する
    pub fn new(file: impl Into<String>, line: u32, binding: Binding) -> Self {
        Self {
            file: file.into(),
            line,
            method: None,
            class: None,
            binding,
            is_block: false,
            args: Vec::new(),
            return_value: None,
        }
    }

    /// 呼び出しイベントからフレームを作成する
    ///
    /// スコープを持たないイベント（クラス定義本体など）には新しいメソッドスコープを割り当てる。
    pub fn from_event(event: &ExecEvent) -> Self {
        let binding = event.binding.clone().unwrap_or_else(Binding::method);
        Self {
            file: event.file.clone(),
            line: event.line,
            method: event.method.clone(),
            class: event.class.clone(),
            binding,
            is_block: event.is_block,
            args: event.args.clone(),
            return_value: None,
        }
    }

    /// 表示用のメソッド名（`Class#method` 形式）
    pub fn label(&self) -> String {
        match (&self.class, &self.method) {
            (Some(class), Some(method)) => format!("{}#{}", class, method),
            (None, Some(method)) => method.clone(),
            (Some(class), None) => format!("<class:{}>", class),
            (None, None) => "<unknown>".to_string(),
        }
    }
}
