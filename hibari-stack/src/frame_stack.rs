//! スレッドごとの呼び出しスタック

use crate::Frame;
use hibari_target::{Binding, Value};
use tracing::warn;

/// 呼び出しスタック
///
/// インデックス0が最も内側（現在実行中）のフレームです。
/// 凍結されたスタックは読み取り専用のスナップショットで、積み降ろしは無視されます。
#[derive(Debug, Clone)]
pub struct FrameStack {
    /// 外側から内側の順に保持する
    frames: Vec<Frame>,
    frozen: bool,
}

impl FrameStack {
    /// 新しい呼び出しスタックを作成する
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            frozen: false,
        }
    }

    /// フレームを積む
    pub fn push(&mut self, frame: Frame) {
        if self.frozen {
            warn!("push on a frozen frame stack ignored");
            return;
        }
        self.frames.push(frame);
    }

    /// 最も内側のフレームを降ろす
    ///
    /// 戻り値が与えられた場合は降ろす前にフレームへ記録する。
    pub fn pop(&mut self, return_value: Option<Value>) -> Option<Frame> {
        if self.frozen {
            warn!("pop on a frozen frame stack ignored");
            return None;
        }
        let mut frame = self.frames.pop()?;
        if return_value.is_some() {
            frame.return_value = return_value;
        }
        Some(frame)
    }

    /// インデックスでフレームを取得する（0が最も内側）
    pub fn get(&self, index: usize) -> Option<&Frame> {
        let len = self.frames.len();
        if index >= len {
            return None;
        }
        self.frames.get(len - 1 - index)
    }

    /// 最も内側のフレーム
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// 指定フレームのスコープチェーン
    pub fn binding(&self, index: usize) -> Option<&Binding> {
        self.get(index).map(|frame| &frame.binding)
    }

    /// 内側から外側の順にフレームを走査する
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    /// スタックの深さ
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// スタックが空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 最も内側のフレームの現在行を更新する
    pub fn set_top_line(&mut self, line: u32) {
        if self.frozen {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// 最も内側のフレームの戻り値を設定する
    pub fn set_top_return_value(&mut self, value: Option<Value>) {
        if self.frozen {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.return_value = value;
        }
    }

    /// 凍結されたコピーを作成する
    pub fn snapshot(&self) -> FrameStack {
        FrameStack {
            frames: self.frames.clone(),
            frozen: true,
        }
    }

    /// このスタックを凍結する
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// 凍結されているか
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(method: &str, line: u32) -> Frame {
        let mut frame = Frame::new("app.rb", line, Binding::method());
        frame.method = Some(method.to_string());
        frame
    }

    #[test]
    fn test_innermost_first() {
        let mut stack = FrameStack::new();
        stack.push(frame("outer", 1));
        stack.push(frame("inner", 5));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.get(0).unwrap().method.as_deref(), Some("inner"));
        assert_eq!(stack.get(1).unwrap().method.as_deref(), Some("outer"));
        assert!(stack.get(2).is_none());
        assert!(stack.binding(2).is_none());

        let names: Vec<_> = stack.iter().filter_map(|f| f.method.clone()).collect();
        assert_eq!(names, vec!["inner".to_string(), "outer".to_string()]);
    }

    #[test]
    fn test_pop_captures_return_value() {
        let mut stack = FrameStack::new();
        stack.push(frame("outer", 1));
        stack.set_top_line(3);
        assert_eq!(stack.get(0).unwrap().line, 3);

        let popped = stack.pop(Some(Value::Int(42))).unwrap();
        assert_eq!(popped.return_value, Some(Value::Int(42)));
        assert!(stack.is_empty());
        assert!(stack.pop(None).is_none());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let mut stack = FrameStack::new();
        stack.push(frame("outer", 1));

        let mut snapshot = stack.snapshot();
        assert!(snapshot.is_frozen());
        snapshot.push(frame("ignored", 2));
        assert!(snapshot.pop(None).is_none());
        assert_eq!(snapshot.depth(), 1);

        // 元のスタックは影響を受けない
        stack.pop(None);
        assert_eq!(snapshot.get(0).unwrap().method.as_deref(), Some("outer"));
    }
}
