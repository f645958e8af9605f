//! デバッガの設定

use std::path::PathBuf;

/// デバッガの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// 終了したコンテキストのフレームを検査用に保持する
    pub post_mortem: bool,
    /// 全スレッドの行トレース
    pub tracing: bool,
    /// 相対パスの基準ディレクトリ
    pub base_dir: PathBuf,
}

impl DebuggerConfig {
    /// 既定の設定を作成する（基準ディレクトリはカレントディレクトリ）
    pub fn new() -> Self {
        Self {
            post_mortem: false,
            tracing: false,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// 環境変数から設定を読み込む
    ///
    /// `HIBARI_POST_MORTEM` と `HIBARI_TRACING` は `1`/`true`/`yes`/`on` で有効、
    /// `HIBARI_BASE_DIR` は基準ディレクトリを上書きします。
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(flag) = env_flag("HIBARI_POST_MORTEM") {
            config.post_mortem = flag;
        }
        if let Some(flag) = env_flag("HIBARI_TRACING") {
            config.tracing = flag;
        }
        if let Ok(dir) = std::env::var("HIBARI_BASE_DIR") {
            if !dir.is_empty() {
                config.base_dir = PathBuf::from(dir);
            }
        }
        config
    }

    pub fn with_post_mortem(mut self, enabled: bool) -> Self {
        self.post_mortem = enabled;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
