//! 跨執行環境的進度交接通道
//!
//! 建構階段與執行階段分屬不同的程序世代，無法共享任何物件參照，
//! 因此以資料夾中的 JSON 檔案作為持久化的 key/value 存放區。
//! 每個 key 一個檔案，寫入時先寫暫存檔再改名，讀取端不會讀到寫到一半的內容。

use crate::component::schedule_builder::{Resolution, TaskKind};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const KEY_RUN_DESCRIPTOR: &str = "run_descriptor";
pub const KEY_ALIVE: &str = "alive";
pub const KEY_ATTACHED: &str = "attached";
pub const KEY_PROGRESS: &str = "progress";
pub const KEY_FAULT: &str = "fault";
pub const KEY_HALT: &str = "halt";

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTake {
    pub kind: TaskKind,
    pub target: Option<String>,
    pub take: u32,
}

/// 一個序列在本次錄製中使用的 take 編號
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeMetadata {
    pub sequence_id: String,
    pub sequence_name: String,
    pub takes: Vec<TaskTake>,
}

/// 交接前寫入的錄製描述，執行環境只能從這裡得知要播放什麼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: Uuid,
    pub artifact_path: PathBuf,
    pub artifact_digest: String,
    pub total_duration: f64,
    pub frame_rate: f64,
    pub warmup_duration: f64,
    pub resolution: Resolution,
    /// 執行環境以此核對排程中每個片段的 take 編號
    pub takes: Vec<TakeMetadata>,
    pub created_at: String,
}

/// 執行環境定期覆寫的進度
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub fraction: f64,
    pub status_text: String,
    pub elapsed_secs: f64,
    pub is_complete: bool,
    pub is_interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachInfo {
    pub pid: u32,
    pub run_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    dir: PathBuf,
}

impl ProgressChannel {
    /// 開啟（必要時建立）通道資料夾
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("無法建立進度通道資料夾: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("無法序列化通道內容: {key}"))?;

        let path = self.entry_path(key);
        let temp_path = path.with_extension(TEMP_EXTENSION);

        fs::write(&temp_path, content)
            .with_context(|| format!("無法寫入通道暫存檔: {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("無法更新通道內容: {}", path.display()))?;

        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("無法讀取通道內容: {}", path.display()))?;

        serde_json::from_str(&content)
            .map(Some)
            .with_context(|| format!("無法解析通道內容: {}", path.display()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key).exists()
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("無法刪除通道內容: {}", path.display()))?;
        }
        Ok(())
    }

    /// 清除通道中的所有內容
    pub fn clear(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("無法讀取進度通道資料夾: {}", self.dir.display()))?
        {
            let path = entry?.path();
            let is_entry = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == ENTRY_EXTENSION || ext == TEMP_EXTENSION);

            if is_entry && path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("無法刪除通道內容: {}", path.display()))?;
            }
        }
        Ok(())
    }

    pub fn write_run_descriptor(&self, descriptor: &RunDescriptor) -> Result<()> {
        self.put(KEY_RUN_DESCRIPTOR, descriptor)
    }

    pub fn read_run_descriptor(&self) -> Result<Option<RunDescriptor>> {
        self.get(KEY_RUN_DESCRIPTOR)
    }

    pub fn set_alive(&self) -> Result<()> {
        self.put(KEY_ALIVE, &true)
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.contains(KEY_ALIVE)
    }

    pub fn mark_attached(&self, info: &AttachInfo) -> Result<()> {
        self.put(KEY_ATTACHED, info)
    }

    pub fn read_attached(&self) -> Result<Option<AttachInfo>> {
        self.get(KEY_ATTACHED)
    }

    /// 寫入進度；比例限制在 0~1 之間，且不會小於上一次的值
    pub fn write_progress(&self, record: &ProgressRecord) -> Result<()> {
        let previous = self.read_progress()?.map_or(0.0, |p| p.fraction);
        let mut record = record.clone();
        record.fraction = record.fraction.clamp(0.0, 1.0).max(previous);
        self.put(KEY_PROGRESS, &record)
    }

    pub fn read_progress(&self) -> Result<Option<ProgressRecord>> {
        self.get(KEY_PROGRESS)
    }

    /// 標記完成並清除存活旗標
    pub fn mark_complete(&self, status_text: &str, elapsed_secs: f64) -> Result<()> {
        self.write_progress(&ProgressRecord {
            fraction: 1.0,
            status_text: status_text.to_string(),
            elapsed_secs,
            is_complete: true,
            is_interrupted: false,
        })?;
        self.remove(KEY_ALIVE)
    }

    /// 標記中斷並清除存活旗標
    pub fn mark_interrupted(&self, status_text: &str, elapsed_secs: f64) -> Result<()> {
        let fraction = self.read_progress()?.map_or(0.0, |p| p.fraction);
        self.write_progress(&ProgressRecord {
            fraction,
            status_text: status_text.to_string(),
            elapsed_secs,
            is_complete: false,
            is_interrupted: true,
        })?;
        self.remove(KEY_ALIVE)
    }

    pub fn report_fault(&self, message: &str) -> Result<()> {
        self.put(KEY_FAULT, &message)?;
        self.remove(KEY_ALIVE)
    }

    pub fn read_fault(&self) -> Result<Option<String>> {
        self.get(KEY_FAULT)
    }

    pub fn request_halt(&self) -> Result<()> {
        self.put(KEY_HALT, &true)
    }

    #[must_use]
    pub fn halt_requested(&self) -> bool {
        self.contains(KEY_HALT)
    }
}
