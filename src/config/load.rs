use crate::config::types::{Config, UserSettings};
use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

impl Config {
    /// 從目前工作目錄的 `settings.json` 載入設定，讀取失敗時使用預設值
    pub fn new() -> Result<Self> {
        Ok(Self::from_path(Path::new(SETTINGS_FILE_NAME)))
    }

    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let settings = load_settings(path).unwrap_or_else(|e| {
            warn!("設定檔無法使用，改用預設值: {e:#}");
            UserSettings::default()
        });
        Self { settings }
    }
}

pub fn load_settings(path: &Path) -> Result<UserSettings> {
    if !path.exists() {
        return Ok(UserSettings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings from {}", path.display()))
}
