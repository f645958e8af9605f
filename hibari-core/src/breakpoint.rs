//! ブレークポイント管理

use crate::{parse, DebugError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// ブレークポイントID
pub type BreakpointId = usize;

/// ブレークポイントの位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// ファイルと行（ファイルは正規化済みの絶対パス）
    Line { file: String, line: u32 },
    /// クラスとメソッド（クラス省略時はメソッド名のみで照合）
    Method { class: Option<String>, method: String },
}

impl Location {
    /// `file:line`、`Class#method`、`Class.method` 形式の文字列をパースする
    pub fn parse(input: &str) -> Result<Self> {
        parse::parse_location(input)
    }

    /// 行イベントと一致するか
    pub fn matches_line(&self, file: &str, line: u32) -> bool {
        matches!(self, Location::Line { file: f, line: l } if *l == line && f == file)
    }

    /// 呼び出しイベントと一致するか
    pub fn matches_call(&self, class: Option<&str>, method: &str) -> bool {
        match self {
            Location::Method {
                class: expected,
                method: m,
            } => m == method && expected.as_deref().map_or(true, |c| Some(c) == class),
            Location::Line { .. } => false,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line { file, line } => write!(f, "{}:{}", file, line),
            Location::Method {
                class: Some(class),
                method,
            } => write!(f, "{}#{}", class, method),
            Location::Method { class: None, method } => write!(f, "{}", method),
        }
    }
}

/// ヒット条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    /// `hit_count % n == 0` のとき停止
    Every(usize),
    /// `hit_count >= n` のとき停止
    AtLeast(usize),
    /// `hit_count == n` のとき停止
    Equal(usize),
}

impl HitCondition {
    /// ヒット回数が条件を満たすか
    pub fn is_met(&self, hit_count: usize) -> bool {
        match *self {
            HitCondition::Every(0) => true,
            HitCondition::Every(n) => hit_count % n == 0,
            HitCondition::AtLeast(n) => hit_count >= n,
            HitCondition::Equal(n) => hit_count == n,
        }
    }
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub location: Location,
    /// 停止したフレームのスコープで評価される条件式
    pub condition: Option<String>,
    pub hit_condition: Option<HitCondition>,
    pub enabled: bool,
    pub hit_count: usize,
}

/// 照合の候補（条件式の評価はテーブルのロック外で行う）
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: BreakpointId,
    pub condition: Option<String>,
}

/// ブレークポイントテーブル
///
/// IDは1から単調増加し、削除されたIDは再利用されません。
#[derive(Debug)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    next_id: BreakpointId,
}

impl BreakpointTable {
    /// 新しいブレークポイントテーブルを作成する
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// ブレークポイントを追加する（有効状態で作成）
    pub fn add(
        &mut self,
        location: Location,
        condition: Option<String>,
        hit_condition: Option<HitCondition>,
    ) -> BreakpointId {
        let id = self.next_id;
        self.next_id += 1;

        self.breakpoints.insert(
            id,
            Breakpoint {
                id,
                location,
                condition,
                hit_condition,
                enabled: true,
                hit_count: 0,
            },
        );
        id
    }

    fn get_mut(&mut self, id: BreakpointId) -> Result<&mut Breakpoint> {
        self.breakpoints
            .get_mut(&id)
            .ok_or_else(|| DebugError::breakpoint_not_found(id))
    }

    /// ブレークポイントを有効化する
    pub fn enable(&mut self, id: BreakpointId) -> Result<()> {
        self.get_mut(id)?.enabled = true;
        Ok(())
    }

    /// ブレークポイントを無効化する
    pub fn disable(&mut self, id: BreakpointId) -> Result<()> {
        self.get_mut(id)?.enabled = false;
        Ok(())
    }

    /// ブレークポイントを削除する
    pub fn delete(&mut self, id: BreakpointId) -> Result<Breakpoint> {
        self.breakpoints
            .remove(&id)
            .ok_or_else(|| DebugError::breakpoint_not_found(id))
    }

    /// 条件式を設定する
    pub fn set_condition(&mut self, id: BreakpointId, condition: Option<String>) -> Result<()> {
        self.get_mut(id)?.condition = condition;
        Ok(())
    }

    /// ヒット条件を設定する
    pub fn set_hit_condition(
        &mut self,
        id: BreakpointId,
        hit_condition: Option<HitCondition>,
    ) -> Result<()> {
        self.get_mut(id)?.hit_condition = hit_condition;
        Ok(())
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// 全てのブレークポイントをID順に取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// ブレークポイントの数
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    /// 全て削除する
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// 行イベントに構造的に一致する有効なブレークポイント
    pub fn line_candidates(&self, file: &str, line: u32) -> Vec<Candidate> {
        self.candidates(|loc| loc.matches_line(file, line))
    }

    /// 呼び出しイベントに構造的に一致する有効なブレークポイント
    pub fn call_candidates(&self, class: Option<&str>, method: &str) -> Vec<Candidate> {
        self.candidates(|loc| loc.matches_call(class, method))
    }

    fn candidates<F: Fn(&Location) -> bool>(&self, matches: F) -> Vec<Candidate> {
        self.breakpoints
            .values()
            .filter(|bp| bp.enabled && matches(&bp.location))
            .map(|bp| Candidate {
                id: bp.id,
                condition: bp.condition.clone(),
            })
            .collect()
    }

    /// ヒットを記録し、停止すべきかを返す
    ///
    /// 条件式を満たした候補に対してのみ呼び出す。照合中に削除や無効化された場合は記録しない。
    pub fn record_hit(&mut self, id: BreakpointId) -> bool {
        match self.breakpoints.get_mut(&id) {
            Some(bp) if bp.enabled => {
                bp.hit_count += 1;
                bp.hit_condition
                    .map_or(true, |cond| cond.is_met(bp.hit_count))
            }
            _ => false,
        }
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}
