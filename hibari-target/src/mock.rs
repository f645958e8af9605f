//! テスト用のインメモリインタプリタ
//!
//! 小さな構造化プログラム（メソッド定義・代入・ブロック付き反復・例外）を
//! 実際のOSスレッド上で実行し、正規化された実行イベントを発行します。
//! `Host` を実装しているので、デバッガをそのまま接続できます。

use crate::{Binding, EventSink, ExceptionInfo, ExecEvent, Host, JumpRequest, Result, Tid, Value};
use hibari_source::{LineTable, RegionKind};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

/// 式
#[derive(Debug, Clone)]
pub enum Expr {
    Lit(Value),
    Var(String),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Lit(Value::Int(value))
    }

    pub fn str(value: &str) -> Self {
        Expr::Lit(Value::Str(value.to_string()))
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Expr::Mul(Box::new(lhs), Box::new(rhs))
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Expr::Div(Box::new(lhs), Box::new(rhs))
    }
}

/// 文
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `name = expr`
    Assign { line: u32, name: String, expr: Expr },
    /// `puts expr`（出力に記録）
    Puts { line: u32, expr: Expr },
    /// `[assign =] method(args...)`
    Call {
        line: u32,
        method: String,
        args: Vec<Expr>,
        assign: Option<String>,
    },
    /// `from.upto(to) do |var| body end`（反復ごとにブロックフレーム）
    Upto {
        line: u32,
        var: String,
        from: i64,
        to: i64,
        body: Vec<Stmt>,
        end_line: u32,
    },
    /// `raise Class, message`
    Raise {
        line: u32,
        class_chain: Vec<String>,
        message: String,
    },
    /// `begin body rescue Classes handler end`（`rescue` が空なら全て捕捉）
    Begin {
        line: u32,
        body: Vec<Stmt>,
        rescue: Vec<String>,
        rescue_line: u32,
        handler: Vec<Stmt>,
        end_line: u32,
    },
}

impl Stmt {
    pub fn assign(line: u32, name: &str, expr: Expr) -> Self {
        Stmt::Assign {
            line,
            name: name.to_string(),
            expr,
        }
    }

    pub fn puts(line: u32, expr: Expr) -> Self {
        Stmt::Puts { line, expr }
    }

    pub fn call(line: u32, method: &str, args: Vec<Expr>) -> Self {
        Stmt::Call {
            line,
            method: method.to_string(),
            args,
            assign: None,
        }
    }

    pub fn call_assign(line: u32, assign: &str, method: &str, args: Vec<Expr>) -> Self {
        Stmt::Call {
            line,
            method: method.to_string(),
            args,
            assign: Some(assign.to_string()),
        }
    }

    pub fn upto(line: u32, var: &str, from: i64, to: i64, body: Vec<Stmt>, end_line: u32) -> Self {
        Stmt::Upto {
            line,
            var: var.to_string(),
            from,
            to,
            body,
            end_line,
        }
    }

    pub fn raise(line: u32, class_chain: &[&str], message: &str) -> Self {
        Stmt::Raise {
            line,
            class_chain: class_chain.iter().map(|c| c.to_string()).collect(),
            message: message.to_string(),
        }
    }

    pub fn begin(
        line: u32,
        body: Vec<Stmt>,
        rescue: &[&str],
        rescue_line: u32,
        handler: Vec<Stmt>,
        end_line: u32,
    ) -> Self {
        Stmt::Begin {
            line,
            body,
            rescue: rescue.iter().map(|c| c.to_string()).collect(),
            rescue_line,
            handler,
            end_line,
        }
    }

    /// 文の行番号
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Assign { line, .. }
            | Stmt::Puts { line, .. }
            | Stmt::Call { line, .. }
            | Stmt::Upto { line, .. }
            | Stmt::Raise { line, .. }
            | Stmt::Begin { line, .. } => *line,
        }
    }
}

/// メソッド定義
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub class: Option<String>,
    pub params: Vec<String>,
    /// `def` の行
    pub line: u32,
    /// `end` の行
    pub end_line: u32,
    pub body: Vec<Stmt>,
}

impl MethodDef {
    pub fn new(name: &str, line: u32, end_line: u32, body: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            class: None,
            params: Vec::new(),
            line,
            end_line,
            body,
        }
    }

    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }
}

/// 1ファイル分のプログラム
#[derive(Debug, Clone)]
pub struct Program {
    pub file: String,
    pub methods: IndexMap<String, MethodDef>,
    pub main: Vec<Stmt>,
}

impl Program {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            methods: IndexMap::new(),
            main: Vec::new(),
        }
    }

    pub fn method(mut self, def: MethodDef) -> Self {
        self.methods.insert(def.name.clone(), def);
        self
    }

    pub fn main(mut self, stmts: Vec<Stmt>) -> Self {
        self.main = stmts;
        self
    }

    /// プログラムから行テーブルを構築する
    pub fn line_table(&self) -> LineTable {
        let mut table = LineTable::new(self.file.clone());
        for def in self.methods.values() {
            table.add_method(def.name.clone(), def.class.clone(), def.line, def.end_line);
            collect_lines(&def.body, &mut table);
        }
        collect_lines(&self.main, &mut table);
        table
    }
}

fn collect_lines(stmts: &[Stmt], table: &mut LineTable) {
    for stmt in stmts {
        table.add_line(stmt.line());
        match stmt {
            Stmt::Upto {
                line,
                body,
                end_line,
                ..
            } => {
                table.add_region(RegionKind::Block, line + 1, *end_line);
                collect_lines(body, table);
            }
            Stmt::Begin {
                line,
                body,
                rescue_line,
                handler,
                end_line,
                ..
            } => {
                if *rescue_line > line + 1 {
                    table.add_region(RegionKind::Begin, line + 1, rescue_line - 1);
                }
                collect_lines(body, table);
                table.add_region(RegionKind::Rescue, *rescue_line, *end_line);
                collect_lines(handler, table);
            }
            _ => {}
        }
    }
}

/// スレッドの実行結果
#[derive(Debug)]
pub struct RunOutcome {
    /// `puts` の出力
    pub output: Vec<String>,
    /// 捕捉されなかった例外
    pub uncaught: Option<ExceptionInfo>,
    /// トップレベルのスコープ
    pub top_level: Binding,
}

/// `StandardError` 系の例外を作成する
pub fn standard_error(class: &str, message: &str) -> ExceptionInfo {
    ExceptionInfo::new(
        vec![
            class.to_string(),
            "StandardError".to_string(),
            "Exception".to_string(),
        ],
        message,
    )
}

struct Inner {
    program: Program,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    /// スレッドごとの実行中の文リスト（行番号）のスタック
    levels: Mutex<HashMap<Tid, Vec<Vec<u32>>>>,
    /// スレッドごとの保留中のjump先
    jumps: Mutex<HashMap<Tid, u32>>,
    eval_events: AtomicBool,
    evaluations: AtomicUsize,
}

/// インメモリインタプリタ
#[derive(Clone)]
pub struct MockInterpreter {
    inner: Arc<Inner>,
}

impl MockInterpreter {
    /// プログラムからインタプリタを作成する
    pub fn new(program: Program) -> Self {
        Self {
            inner: Arc::new(Inner {
                program,
                sink: RwLock::new(None),
                levels: Mutex::new(HashMap::new()),
                jumps: Mutex::new(HashMap::new()),
                eval_events: AtomicBool::new(false),
                evaluations: AtomicUsize::new(0),
            }),
        }
    }

    /// プログラムを取得する
    pub fn program(&self) -> &Program {
        &self.inner.program
    }

    /// 式評価のたびに評価自身の実行イベントを発行するかどうか
    pub fn set_eval_emits_events(&self, enabled: bool) {
        self.inner.eval_events.store(enabled, Ordering::SeqCst);
    }

    /// これまでに `evaluate` が呼ばれた回数
    pub fn evaluations(&self) -> usize {
        self.inner.evaluations.load(Ordering::SeqCst)
    }

    /// フックが設定されているか
    pub fn hooks_installed(&self) -> bool {
        self.inner.sink.read().is_some()
    }

    /// 別スレッドでメインプログラムを実行する
    pub fn spawn(&self, tid: Tid) -> JoinHandle<RunOutcome> {
        let interp = self.clone();
        std::thread::spawn(move || interp.run(tid))
    }

    /// 現在のスレッドでメインプログラムを実行する
    pub fn run(&self, tid: Tid) -> RunOutcome {
        let top_level = Binding::method();
        self.emit(ExecEvent::thread_create(tid).with_binding(top_level.clone()));

        let mut output = Vec::new();
        let main = &self.inner.program.main;
        let result = self.exec_block(tid, main, &top_level, "<main>", &mut output);
        let uncaught = result.err();
        if let Some(exc) = &uncaught {
            debug!("{} terminated by uncaught {}", tid, exc.class_name());
        }

        self.emit(ExecEvent::thread_exit(tid, uncaught.clone()));
        self.inner.levels.lock().remove(&tid);
        self.inner.jumps.lock().remove(&tid);

        RunOutcome {
            output,
            uncaught,
            top_level,
        }
    }

    fn file(&self) -> &str {
        &self.inner.program.file
    }

    fn emit(&self, event: ExecEvent) {
        // フック解除と競合しないようにロックを外してから呼び出す
        let sink = self.inner.sink.read().clone();
        if let Some(sink) = sink {
            sink.on_event(event);
        }
    }

    fn raise(&self, tid: Tid, line: u32, exception: ExceptionInfo) -> ExceptionInfo {
        self.emit(ExecEvent::raise(tid, self.file(), line, exception.clone()));
        exception
    }

    fn take_jump(&self, tid: Tid) -> Option<u32> {
        self.inner.jumps.lock().remove(&tid)
    }

    fn exec_block(
        &self,
        tid: Tid,
        stmts: &[Stmt],
        binding: &Binding,
        method: &str,
        out: &mut Vec<String>,
    ) -> std::result::Result<Value, ExceptionInfo> {
        let lines = stmts.iter().map(Stmt::line).collect();
        self.inner.levels.lock().entry(tid).or_default().push(lines);

        let result = self.exec_stmts(tid, stmts, binding, method, out);

        if let Some(levels) = self.inner.levels.lock().get_mut(&tid) {
            levels.pop();
        }
        result
    }

    fn exec_stmts(
        &self,
        tid: Tid,
        stmts: &[Stmt],
        binding: &Binding,
        method: &str,
        out: &mut Vec<String>,
    ) -> std::result::Result<Value, ExceptionInfo> {
        let mut last = Value::Nil;
        let mut pc = 0;
        while pc < stmts.len() {
            let stmt = &stmts[pc];
            self.emit(ExecEvent::line(tid, self.file(), stmt.line()));

            if let Some(target) = self.take_jump(tid) {
                if let Some(index) = stmts.iter().position(|s| s.line() == target) {
                    pc = index;
                    continue;
                }
            }

            last = self.exec_stmt(tid, stmt, binding, method, out)?;
            pc += 1;
        }
        Ok(last)
    }

    fn exec_stmt(
        &self,
        tid: Tid,
        stmt: &Stmt,
        binding: &Binding,
        method: &str,
        out: &mut Vec<String>,
    ) -> std::result::Result<Value, ExceptionInfo> {
        match stmt {
            Stmt::Assign { line, name, expr } => {
                let value = self.eval_at(tid, *line, expr, binding)?;
                binding.set(name, value.clone());
                Ok(value)
            }
            Stmt::Puts { line, expr } => {
                let value = self.eval_at(tid, *line, expr, binding)?;
                out.push(value.to_string());
                Ok(Value::Nil)
            }
            Stmt::Call {
                line,
                method: callee,
                args,
                assign,
            } => {
                let value = self.call_method(tid, *line, callee, args, binding, out)?;
                if let Some(name) = assign {
                    binding.set(name, value.clone());
                }
                Ok(value)
            }
            Stmt::Upto {
                line,
                var,
                from,
                to,
                body,
                end_line,
            } => {
                for i in *from..=*to {
                    let block = binding.block();
                    block.define(var, Value::Int(i));
                    let event = ExecEvent::block_call(
                        tid,
                        self.file(),
                        *line,
                        format!("block in {}", method),
                        block.clone(),
                    )
                    .with_args(vec![var.clone()]);
                    self.emit(event);

                    match self.exec_block(tid, body, &block, method, out) {
                        Ok(value) => {
                            self.emit(ExecEvent::ret(tid, self.file(), *end_line, Some(value)));
                        }
                        Err(exception) => {
                            self.emit(ExecEvent::ret(tid, self.file(), *end_line, None));
                            return Err(exception);
                        }
                    }
                }
                Ok(Value::Int(*from))
            }
            Stmt::Raise {
                line,
                class_chain,
                message,
            } => {
                let exception = ExceptionInfo::new(class_chain.clone(), message.clone());
                Err(self.raise(tid, *line, exception))
            }
            Stmt::Begin {
                body,
                rescue,
                rescue_line,
                handler,
                ..
            } => match self.exec_block(tid, body, binding, method, out) {
                Ok(value) => Ok(value),
                Err(exception) if rescue.is_empty() || rescue.iter().any(|c| exception.is_a(c)) => {
                    self.emit(ExecEvent::rescue(tid, self.file(), *rescue_line, exception));
                    self.exec_block(tid, handler, binding, method, out)
                }
                Err(exception) => Err(exception),
            },
        }
    }

    fn call_method(
        &self,
        tid: Tid,
        line: u32,
        name: &str,
        args: &[Expr],
        binding: &Binding,
        out: &mut Vec<String>,
    ) -> std::result::Result<Value, ExceptionInfo> {
        let def = match self.inner.program.methods.get(name) {
            Some(def) => def,
            None => {
                let exception = ExceptionInfo::new(
                    vec![
                        "NoMethodError".to_string(),
                        "NameError".to_string(),
                        "StandardError".to_string(),
                        "Exception".to_string(),
                    ],
                    format!("undefined method `{}'", name),
                );
                return Err(self.raise(tid, line, exception));
            }
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_at(tid, line, arg, binding)?);
        }

        let callee = Binding::method();
        for (param, value) in def.params.iter().zip(values) {
            callee.define(param, value);
        }

        let mut event = ExecEvent::call(tid, self.file(), def.line, def.name.clone(), callee.clone())
            .with_args(def.params.clone());
        if let Some(class) = &def.class {
            event = event.with_class(class.clone());
        }
        self.emit(event);

        match self.exec_block(tid, &def.body, &callee, &def.name, out) {
            Ok(value) => {
                self.emit(ExecEvent::ret(tid, self.file(), def.end_line, Some(value.clone())));
                Ok(value)
            }
            Err(exception) => {
                self.emit(ExecEvent::ret(tid, self.file(), def.end_line, None));
                Err(exception)
            }
        }
    }

    /// 式を評価し、例外が起きたら `raise` イベントを発行する
    fn eval_at(
        &self,
        tid: Tid,
        line: u32,
        expr: &Expr,
        binding: &Binding,
    ) -> std::result::Result<Value, ExceptionInfo> {
        eval_expr(expr, binding).map_err(|exception| self.raise(tid, line, exception))
    }
}

fn eval_expr(expr: &Expr, binding: &Binding) -> std::result::Result<Value, ExceptionInfo> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Var(name) => binding.get(name).ok_or_else(|| {
            ExceptionInfo::new(
                vec![
                    "NameError".to_string(),
                    "StandardError".to_string(),
                    "Exception".to_string(),
                ],
                format!("undefined local variable or method `{}'", name),
            )
        }),
        Expr::Add(lhs, rhs) => match (eval_expr(lhs, binding)?, eval_expr(rhs, binding)?) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (a, b) => Err(type_error(&a, &b)),
        },
        Expr::Mul(lhs, rhs) => match (eval_expr(lhs, binding)?, eval_expr(rhs, binding)?) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
            (a, b) => Err(type_error(&a, &b)),
        },
        Expr::Div(lhs, rhs) => match (eval_expr(lhs, binding)?, eval_expr(rhs, binding)?) {
            (Value::Int(_), Value::Int(0)) => Err(standard_error("ZeroDivisionError", "divided by 0")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(b))),
            (a, b) => Err(type_error(&a, &b)),
        },
    }
}

fn type_error(lhs: &Value, rhs: &Value) -> ExceptionInfo {
    standard_error(
        "TypeError",
        &format!("{} can't be coerced into {}", rhs.class_name(), lhs.class_name()),
    )
}

impl Host for MockInterpreter {
    fn install_hooks(&self, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut slot = self.inner.sink.write();
        if slot.is_some() {
            return Err(anyhow::anyhow!("Event hooks are already installed"));
        }
        *slot = Some(sink);
        debug!("event hooks installed for {}", self.inner.program.file);
        Ok(())
    }

    fn remove_hooks(&self) {
        if self.inner.sink.write().take().is_some() {
            debug!("event hooks removed for {}", self.inner.program.file);
        }
    }

    fn evaluate(&self, tid: Tid, expr: &str, binding: &Binding) -> Result<Value> {
        self.inner.evaluations.fetch_add(1, Ordering::SeqCst);

        if self.inner.eval_events.load(Ordering::SeqCst) {
            // 評価自身も実行イベントを発生させる
            let scope = binding.block();
            self.emit(ExecEvent::block_call(tid, "(eval)", 1, "(eval)", scope));
            self.emit(ExecEvent::line(tid, "(eval)", 1));
            self.emit(ExecEvent::ret(tid, "(eval)", 1, None));
        }

        eval_source(expr, binding)
    }

    fn set_next_statement(&self, tid: Tid, request: &JumpRequest) -> Result<()> {
        let levels = self.inner.levels.lock();
        let current = levels
            .get(&tid)
            .and_then(|levels| levels.last())
            .ok_or_else(|| anyhow::anyhow!("{} is not executing", tid))?;

        if !current.contains(&request.to_line) {
            return Err(anyhow::anyhow!(
                "line {} is not a statement of the current block",
                request.to_line
            ));
        }

        self.inner.jumps.lock().insert(tid, request.to_line);
        debug!(
            "{} will resume at line {} instead of {}",
            tid, request.to_line, request.from_line
        );
        Ok(())
    }
}

/// 条件式用の簡易評価器
///
/// `a && b`、`a || b`、比較演算子（`== != <= >= < >`）、整数・文字列・
/// `true`/`false`/`nil` リテラルとローカル変数をサポートする。
fn eval_source(src: &str, binding: &Binding) -> Result<Value> {
    let src = src.trim();

    if let Some((lhs, rhs)) = src.split_once("||") {
        let value = eval_source(lhs, binding)?.is_truthy() || eval_source(rhs, binding)?.is_truthy();
        return Ok(Value::Bool(value));
    }
    if let Some((lhs, rhs)) = src.split_once("&&") {
        let value = eval_source(lhs, binding)?.is_truthy() && eval_source(rhs, binding)?.is_truthy();
        return Ok(Value::Bool(value));
    }

    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some((lhs, rhs)) = src.split_once(op) {
            let lhs = eval_term(lhs, binding)?;
            let rhs = eval_term(rhs, binding)?;
            return compare(op, &lhs, &rhs).map(Value::Bool);
        }
    }

    eval_term(src, binding)
}

fn eval_term(src: &str, binding: &Binding) -> Result<Value> {
    let src = src.trim();

    if let Ok(i) = src.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    match src {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "nil" => return Ok(Value::Nil),
        _ => {}
    }
    for quote in ['\'', '"'] {
        if src.len() >= 2 && src.starts_with(quote) && src.ends_with(quote) {
            return Ok(Value::Str(src[1..src.len() - 1].to_string()));
        }
    }

    let is_identifier = src
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false)
        && src.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_identifier {
        return Err(anyhow::anyhow!("syntax error in expression '{}'", src));
    }

    binding
        .get(src)
        .ok_or_else(|| anyhow::anyhow!("undefined local variable or method `{}'", src))
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> Result<bool> {
    match op {
        "==" => return Ok(lhs == rhs),
        "!=" => return Ok(lhs != rhs),
        _ => {}
    }

    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            return Err(anyhow::anyhow!(
                "comparison of {} with {} failed",
                lhs.class_name(),
                rhs.class_name()
            ))
        }
    };

    Ok(match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}
