//! ステップ実行の状態機械

use hibari_target::EventKind;

/// ステップの粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// 呼び出し先に入る
    Into,
    /// 呼び出しを一つの文として扱う
    Over,
    /// 現在のフレームから抜ける
    Out,
}

impl StepMode {
    /// `into`/`over`/`out` をパースする
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "into" => Some(StepMode::Into),
            "over" => Some(StepMode::Over),
            "out" => Some(StepMode::Out),
            _ => None,
        }
    }
}

/// ステップ状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// 通常実行
    Running,
    /// 任意の深さの行イベントを `remaining` 回数えたら停止
    Into {
        remaining: usize,
        /// 開始行と異なる行でのみ数える
        force: bool,
        origin_file: String,
        origin_line: u32,
    },
    /// 深さ `depth` 以下の行イベントを `remaining` 回数えるか、その深さで復帰したら停止
    Over { depth: usize, remaining: usize },
    /// 深さ `depth` より浅い行イベントまたは復帰で停止
    Out { depth: usize },
    /// 指定ファイルの指定行で停止
    ContinueTo { file: String, line: u32 },
}

/// コンテキストごとのステップ制御
///
/// 状態はコントローラのコマンドでのみ設定され、停止を決定すると `Running` に戻ります。
#[derive(Debug, Clone)]
pub struct StepController {
    state: StepState,
}

impl StepController {
    /// 新しいステップ制御を作成する（`Running`）
    pub fn new() -> Self {
        Self {
            state: StepState::Running,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> &StepState {
        &self.state
    }

    /// 通常実行中か
    pub fn is_running(&self) -> bool {
        self.state == StepState::Running
    }

    pub fn step_into(&mut self, count: usize, force: bool, file: &str, line: u32) {
        self.state = StepState::Into {
            remaining: count.max(1),
            force,
            origin_file: file.to_string(),
            origin_line: line,
        };
    }

    pub fn step_over(&mut self, depth: usize, count: usize) {
        self.state = StepState::Over {
            depth,
            remaining: count.max(1),
        };
    }

    pub fn step_out(&mut self, depth: usize) {
        self.state = StepState::Out { depth };
    }

    pub fn continue_to(&mut self, file: &str, line: u32) {
        self.state = StepState::ContinueTo {
            file: file.to_string(),
            line,
        };
    }

    /// 状態を `Running` に戻す
    pub fn cancel(&mut self) {
        self.state = StepState::Running;
    }

    /// イベントで停止すべきかを判定する
    ///
    /// `depth` はイベント処理後（復帰イベントでは降ろす前）のスタックの深さ。
    /// `file` は正規化済みのパス。
    pub fn on_event(&mut self, kind: EventKind, depth: usize, file: &str, line: u32) -> bool {
        let is_line = kind == EventKind::Line;
        let is_return = matches!(kind, EventKind::Return | EventKind::ClassExit);

        let stop = match &mut self.state {
            StepState::Running => false,
            StepState::Into {
                remaining,
                force,
                origin_file,
                origin_line,
            } => {
                if !is_line || (*force && *origin_line == line && origin_file == file) {
                    false
                } else {
                    *remaining -= 1;
                    *remaining == 0
                }
            }
            StepState::Over {
                depth: target,
                remaining,
            } => {
                if depth > *target {
                    false
                } else if is_return {
                    true
                } else if is_line {
                    *remaining -= 1;
                    *remaining == 0 || depth < *target
                } else {
                    false
                }
            }
            StepState::Out { depth: target } => (is_line || is_return) && depth < *target,
            StepState::ContinueTo {
                file: target_file,
                line: target_line,
            } => is_line && *target_line == line && target_file == file,
        };

        if stop {
            self.state = StepState::Running;
        }
        stop
    }
}

impl Default for StepController {
    fn default() -> Self {
        Self::new()
    }
}
