//! パース関連のユーティリティ関数

use crate::{DebugError, Location, Result};
use regex::Regex;

/// ブレークポイント位置をパースする
///
/// `file:line`、`Class#method`、`Class.method`、`Mod::Class#method` をサポート。
/// ファイルパスはこの時点では正規化しない。
///
/// # Examples
/// ```
/// use hibari_core::{parse::parse_location, Location};
///
/// assert_eq!(
///     parse_location("lib/app.rb:12").unwrap(),
///     Location::Line { file: "lib/app.rb".to_string(), line: 12 }
/// );
/// ```
pub fn parse_location(input: &str) -> Result<Location> {
    let input = input.trim();

    let line_re = Regex::new(r"^(?P<file>.+):(?P<line>\d+)$").map_err(invalid_regex)?;
    if let Some(caps) = line_re.captures(input) {
        let line = parse_count(&caps["line"])?;
        let line = u32::try_from(line)
            .map_err(|_| DebugError::InvalidCommand(format!("Line number {} is too large", line)))?;
        return Ok(Location::Line {
            file: caps["file"].to_string(),
            line,
        });
    }

    let method_re = Regex::new(
        r"^(?P<class>[A-Z][A-Za-z0-9_]*(?:::[A-Z][A-Za-z0-9_]*)*)[#.](?P<method>[a-z_][A-Za-z0-9_]*[?!=]?)$",
    )
    .map_err(invalid_regex)?;
    if let Some(caps) = method_re.captures(input) {
        return Ok(Location::Method {
            class: Some(caps["class"].to_string()),
            method: caps["method"].to_string(),
        });
    }

    Err(DebugError::InvalidCommand(format!(
        "Invalid location '{}'",
        input
    )))
}

/// 正の整数（行番号や回数）をパースする
pub fn parse_count(s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .map_err(|e| DebugError::InvalidCommand(format!("Invalid number '{}': {}", s.trim(), e)))
}

fn invalid_regex(err: regex::Error) -> DebugError {
    DebugError::InvalidCommand(err.to_string())
}
