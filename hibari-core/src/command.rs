//! 実行制御コマンド

use crate::parse::parse_count;

/// 実行制御コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 実行継続
    Continue,
    /// ステップイン（`force` なら同じ行では止まらない）
    Step { count: usize, force: bool },
    /// ステップオーバー
    Next { count: usize },
    /// 指定フレームから抜けるまで実行
    Finish { frame: usize },
    /// 次に実行する行を変更
    Jump { line: u32 },
    /// 指定行まで実行
    Until { line: u32 },
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let (name, args) = parts.split_first()?;

        let count = |default: usize| -> Option<usize> {
            match args.first() {
                Some(arg) => parse_count(arg).ok().filter(|n| *n > 0),
                None => Some(default),
            }
        };
        let line = || -> Option<u32> {
            let arg = args.first()?;
            parse_count(arg).ok().and_then(|n| u32::try_from(n).ok())
        };

        if args.len() > 1 {
            return None;
        }

        match *name {
            "continue" | "c" => args.is_empty().then_some(Command::Continue),
            "step" | "s" => Some(Command::Step {
                count: count(1)?,
                force: false,
            }),
            "step+" | "s+" => Some(Command::Step {
                count: count(1)?,
                force: true,
            }),
            "next" | "n" => Some(Command::Next { count: count(1)? }),
            "finish" | "fin" => {
                let frame = match args.first() {
                    Some(arg) => parse_count(arg).ok()?,
                    None => 0,
                };
                Some(Command::Finish { frame })
            }
            "jump" => Some(Command::Jump { line: line()? }),
            "until" | "u" => Some(Command::Until { line: line()? }),
            _ => None,
        }
    }
}
