//! ソース行情報

use std::collections::BTreeSet;
use thiserror::Error;

/// 行番号（1始まり）
pub type Line = u32;

/// 領域の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// ブロック（クロージャ）本体
    Block,
    /// begin節（rescueで保護される本体）
    Begin,
    /// rescue節
    Rescue,
    /// ensure節
    Ensure,
}

/// ソース上の領域（両端を含む）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub start: Line,
    pub end: Line,
}

impl Region {
    fn contains(&self, line: Line) -> bool {
        self.start <= line && line <= self.end
    }

    fn span(&self) -> Line {
        self.end - self.start
    }
}

/// メソッド定義の範囲（両端を含む）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRange {
    pub name: String,
    pub class: Option<String>,
    pub start: Line,
    pub end: Line,
}

impl MethodRange {
    fn contains(&self, line: Line) -> bool {
        self.start <= line && line <= self.end
    }
}

/// jump先が不正な理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JumpViolation {
    #[error("line {0} is not a statement boundary")]
    NotStatement(Line),
    #[error("line {to} is outside of the method containing line {from}")]
    OtherMethod { from: Line, to: Line },
    #[error("jump from line {from} to line {to} crosses a {kind:?} boundary")]
    CrossesRegion { from: Line, to: Line, kind: RegionKind },
}

/// 1ファイル分の行テーブル
///
/// 実行可能な行の集合と、メソッド・領域の範囲を保持します。
#[derive(Debug, Clone)]
pub struct LineTable {
    file: String,
    lines: BTreeSet<Line>,
    methods: Vec<MethodRange>,
    regions: Vec<Region>,
}

impl LineTable {
    /// 空の行テーブルを作成する
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            lines: BTreeSet::new(),
            methods: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// ファイル名を取得する
    pub fn file(&self) -> &str {
        &self.file
    }

    /// 実行可能な行を追加する
    pub fn add_line(&mut self, line: Line) -> &mut Self {
        self.lines.insert(line);
        self
    }

    /// メソッドの範囲を追加する
    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        class: Option<String>,
        start: Line,
        end: Line,
    ) -> &mut Self {
        self.methods.push(MethodRange {
            name: name.into(),
            class,
            start,
            end,
        });
        self
    }

    /// 領域を追加する
    pub fn add_region(&mut self, kind: RegionKind, start: Line, end: Line) -> &mut Self {
        self.regions.push(Region { kind, start, end });
        self
    }

    /// 行が実行可能な文の先頭かどうか
    pub fn is_executable(&self, line: Line) -> bool {
        self.lines.contains(&line)
    }

    /// 指定行以降で最初の実行可能行
    pub fn next_executable(&self, line: Line) -> Option<Line> {
        self.lines.range(line..).next().copied()
    }

    /// 実行可能な行をすべて取得する
    pub fn executable_lines(&self) -> impl Iterator<Item = Line> + '_ {
        self.lines.iter().copied()
    }

    /// 行を含む最も内側のメソッド
    pub fn method_at(&self, line: Line) -> Option<&MethodRange> {
        self.methods
            .iter()
            .filter(|m| m.contains(line))
            .min_by_key(|m| m.end - m.start)
    }

    /// 行を含む最も内側の領域
    pub fn region_at(&self, line: Line) -> Option<&Region> {
        self.regions
            .iter()
            .filter(|r| r.contains(line))
            .min_by_key(|r| r.span())
    }

    /// `from` で停止しているフレームの次の文を `to` に移してよいか検証する
    ///
    /// `to` は実行可能行であり、同じメソッド内にあり、
    /// ブロック・begin・rescue・ensure の境界をまたいではならない。
    pub fn check_jump(&self, from: Line, to: Line) -> Result<(), JumpViolation> {
        if !self.is_executable(to) {
            return Err(JumpViolation::NotStatement(to));
        }

        if self.method_at(from) != self.method_at(to) {
            return Err(JumpViolation::OtherMethod { from, to });
        }

        let from_region = self.region_at(from);
        let to_region = self.region_at(to);
        if from_region != to_region {
            // 入る側・出る側のどちらか内側の領域を報告する
            let kind = to_region
                .or(from_region)
                .map(|r| r.kind)
                .unwrap_or(RegionKind::Block);
            return Err(JumpViolation::CrossesRegion { from, to, kind });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    ///  1 def work
    ///  2   a = 1
    ///  3   begin
    ///  4     b = 2
    ///  5   rescue
    ///  6     c = 3
    ///  7   end
    ///  8   d = 4
    ///  9 end
    /// 10 work
    /// ```
    fn sample() -> LineTable {
        let mut table = LineTable::new("sample.rb");
        for line in [2, 4, 6, 8, 10] {
            table.add_line(line);
        }
        table
            .add_method("work", None, 1, 9)
            .add_region(RegionKind::Begin, 4, 4)
            .add_region(RegionKind::Rescue, 5, 7);
        table
    }

    #[test]
    fn test_executable_lines() {
        let table = sample();
        assert!(table.is_executable(2));
        assert!(!table.is_executable(3));
        assert_eq!(table.next_executable(3), Some(4));
        assert_eq!(table.next_executable(11), None);
    }

    #[test]
    fn test_jump_within_method() {
        let table = sample();
        assert_eq!(table.check_jump(2, 8), Ok(()));
        assert_eq!(table.check_jump(8, 2), Ok(()));
        assert_eq!(table.check_jump(4, 4), Ok(()));
    }

    #[test]
    fn test_jump_rejections() {
        let table = sample();
        assert_eq!(table.check_jump(2, 3), Err(JumpViolation::NotStatement(3)));
        assert_eq!(
            table.check_jump(2, 10),
            Err(JumpViolation::OtherMethod { from: 2, to: 10 })
        );
        assert_eq!(
            table.check_jump(2, 6),
            Err(JumpViolation::CrossesRegion {
                from: 2,
                to: 6,
                kind: RegionKind::Rescue
            })
        );
        assert!(table.check_jump(6, 8).is_err());
    }

    #[test]
    fn test_jump_across_protected_body() {
        let table = sample();
        // 保護された本体へ入る
        assert_eq!(
            table.check_jump(2, 4),
            Err(JumpViolation::CrossesRegion {
                from: 2,
                to: 4,
                kind: RegionKind::Begin
            })
        );
        // 保護された本体から出る
        assert_eq!(
            table.check_jump(4, 8),
            Err(JumpViolation::CrossesRegion {
                from: 4,
                to: 8,
                kind: RegionKind::Begin
            })
        );
        // 本体からrescue節へ
        assert_eq!(
            table.check_jump(4, 6),
            Err(JumpViolation::CrossesRegion {
                from: 4,
                to: 6,
                kind: RegionKind::Rescue
            })
        );
    }

    #[test]
    fn test_innermost_method() {
        let mut table = LineTable::new("nested.rb");
        table
            .add_method("outer", None, 1, 20)
            .add_method("inner", Some("Foo".to_string()), 5, 8);
        assert_eq!(table.method_at(6).map(|m| m.name.as_str()), Some("inner"));
        assert_eq!(table.method_at(10).map(|m| m.name.as_str()), Some("outer"));
        assert!(table.method_at(30).is_none());
    }
}
