//! 正規化された実行イベント

use crate::{Binding, Tid, Value};

/// 実行イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// 新しい行の実行開始
    Line,
    /// メソッドまたはブロックの呼び出し
    Call,
    /// メソッドまたはブロックからの復帰
    Return,
    /// クラス定義本体への進入
    ClassEnter,
    /// クラス定義本体からの退出
    ClassExit,
    /// 例外の送出
    Raise,
    /// 例外の捕捉（rescue節への進入）
    Rescue,
    /// スレッド生成
    ThreadCreate,
    /// スレッド終了
    ThreadExit,
}

impl EventKind {
    /// 表示用の名前
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Line => "line",
            EventKind::Call => "call",
            EventKind::Return => "return",
            EventKind::ClassEnter => "class",
            EventKind::ClassExit => "end",
            EventKind::Raise => "raise",
            EventKind::Rescue => "rescue",
            EventKind::ThreadCreate => "thread-create",
            EventKind::ThreadExit => "thread-exit",
        }
    }
}

/// 例外情報
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    /// 例外クラスの祖先チェーン（最も派生したクラスが先頭）
    pub class_chain: Vec<String>,
    pub message: String,
}

impl ExceptionInfo {
    /// 例外情報を作成する
    pub fn new(class_chain: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            class_chain,
            message: message.into(),
        }
    }

    /// 例外クラス名
    pub fn class_name(&self) -> &str {
        self.class_chain.first().map(String::as_str).unwrap_or("Exception")
    }

    /// 指定クラスのインスタンスかどうか（祖先を含む）
    pub fn is_a(&self, class: &str) -> bool {
        self.class_chain.iter().any(|c| c == class)
    }
}

/// 実行イベント
///
/// ホストはすべての実行イベントをこの形に正規化してデバッガへ渡します。
/// `binding` は `Call`/`ClassEnter`/`ThreadCreate` でのみ、`is_block` と `args` は `Call` でのみ、
/// `return_value` は `Return`/`ClassExit` でのみ意味を持ちます。
/// 例外による巻き戻し中の `Return` は `return_value` を持ちません。
#[derive(Debug, Clone)]
pub struct ExecEvent {
    pub kind: EventKind,
    pub tid: Tid,
    pub file: String,
    pub line: u32,
    pub method: Option<String>,
    pub class: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub binding: Option<Binding>,
    pub is_block: bool,
    pub args: Vec<String>,
    pub return_value: Option<Value>,
}

impl ExecEvent {
    /// 最小限のイベントを作成する
    pub fn new(kind: EventKind, tid: Tid, file: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            tid,
            file: file.into(),
            line,
            method: None,
            class: None,
            exception: None,
            binding: None,
            is_block: false,
            args: Vec::new(),
            return_value: None,
        }
    }

    /// 行イベント
    pub fn line(tid: Tid, file: impl Into<String>, line: u32) -> Self {
        Self::new(EventKind::Line, tid, file, line)
    }

    /// メソッド呼び出しイベント
    pub fn call(
        tid: Tid,
        file: impl Into<String>,
        line: u32,
        method: impl Into<String>,
        binding: Binding,
    ) -> Self {
        let mut event = Self::new(EventKind::Call, tid, file, line);
        event.method = Some(method.into());
        event.binding = Some(binding);
        event
    }

    /// ブロック呼び出しイベント
    pub fn block_call(
        tid: Tid,
        file: impl Into<String>,
        line: u32,
        method: impl Into<String>,
        binding: Binding,
    ) -> Self {
        let mut event = Self::call(tid, file, line, method, binding);
        event.is_block = true;
        event
    }

    /// 復帰イベント
    pub fn ret(tid: Tid, file: impl Into<String>, line: u32, value: Option<Value>) -> Self {
        let mut event = Self::new(EventKind::Return, tid, file, line);
        event.return_value = value;
        event
    }

    /// 例外送出イベント
    pub fn raise(tid: Tid, file: impl Into<String>, line: u32, exception: ExceptionInfo) -> Self {
        let mut event = Self::new(EventKind::Raise, tid, file, line);
        event.exception = Some(exception);
        event
    }

    /// 例外捕捉イベント
    pub fn rescue(tid: Tid, file: impl Into<String>, line: u32, exception: ExceptionInfo) -> Self {
        let mut event = Self::new(EventKind::Rescue, tid, file, line);
        event.exception = Some(exception);
        event
    }

    /// スレッド生成イベント
    pub fn thread_create(tid: Tid) -> Self {
        Self::new(EventKind::ThreadCreate, tid, "", 0)
    }

    /// スレッド終了イベント（捕捉されなかった例外があれば添付）
    pub fn thread_exit(tid: Tid, uncaught: Option<ExceptionInfo>) -> Self {
        let mut event = Self::new(EventKind::ThreadExit, tid, "", 0);
        event.exception = uncaught;
        event
    }

    /// クラスを設定する
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// スコープを設定する（トップレベルのスコープを渡すスレッド生成イベントなど）
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// 引数名を設定する
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// フレームを積むイベントかどうか
    pub fn pushes_frame(&self) -> bool {
        matches!(self.kind, EventKind::Call | EventKind::ClassEnter)
    }

    /// フレームを降ろすイベントかどうか
    pub fn pops_frame(&self) -> bool {
        matches!(self.kind, EventKind::Return | EventKind::ClassExit)
    }
}
