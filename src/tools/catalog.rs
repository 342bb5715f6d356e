use crate::component::schedule_builder::{Sequence, TaskTable};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// 可錄製序列的目錄，對應 `catalog.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceCatalog {
    pub sequences: Vec<Sequence>,
}

impl SequenceCatalog {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("無法讀取序列目錄: {}", path.display()))?;

        let catalog: Self = serde_json::from_str(&content)
            .with_context(|| format!("無法解析序列目錄: {}", path.display()))?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = catalog.sequences.iter().find(|s| !seen.insert(&s.id)) {
            bail!("序列目錄中有重複的 id: {}", duplicate.id);
        }

        Ok(catalog)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id == id)
    }
}

/// 錄製計畫：選取的序列（依錄製順序）與每個序列的錄製任務，對應 `plan.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingPlan {
    pub selected: Vec<String>,
    #[serde(default)]
    pub tasks: TaskTable,
}

impl RecordingPlan {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("無法讀取錄製計畫: {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let plan: Self = serde_json::from_str(&content)
            .with_context(|| format!("無法解析錄製計畫: {}", path.display()))?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = plan.selected.iter().find(|id| !seen.insert(*id)) {
            bail!("錄製計畫中重複選取了序列: {duplicate}");
        }

        Ok(plan)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self).context("無法序列化錄製計畫")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("無法建立目錄: {}", parent.display()))?;
        }

        fs::write(path, content)
            .with_context(|| format!("無法寫入錄製計畫: {}", path.display()))?;

        Ok(())
    }

    /// 依選取順序取出序列；找不到的 id 會回傳在第二個值中，重複的 id 只取第一次
    #[must_use]
    pub fn selected_sequences(&self, catalog: &SequenceCatalog) -> (Vec<Sequence>, Vec<String>) {
        let mut sequences = Vec::with_capacity(self.selected.len());
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for id in self.selected.iter().filter(|id| seen.insert(id.as_str())) {
            match catalog.get(id) {
                Some(sequence) => sequences.push(sequence.clone()),
                None => missing.push(id.clone()),
            }
        }

        (sequences, missing)
    }

    /// 選取的序列中啟用的任務數量
    #[must_use]
    pub fn enabled_task_count(&self) -> usize {
        self.selected
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|list| list.iter().filter(|t| t.enabled).count())
            .sum()
    }
}
