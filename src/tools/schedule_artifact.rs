use crate::component::execution_controller::{MaterializedArtifact, ScheduleMaterializer};
use crate::component::schedule_builder::{MasterSchedule, TIME_EPSILON};
use crate::tools::ensure_directory_exists;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

pub const SCHEDULE_FILE_NAME: &str = "schedule.json";

#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// 將主排程寫入錄製資料夾
pub fn write_schedule_artifact(
    schedule: &MasterSchedule,
    run_dir: &Path,
) -> Result<MaterializedArtifact> {
    ensure_directory_exists(run_dir)?;

    let content = serde_json::to_vec_pretty(schedule).context("無法序列化主排程")?;
    let path = run_dir.join(SCHEDULE_FILE_NAME);
    fs::write(&path, &content)
        .with_context(|| format!("無法寫入排程檔案: {}", path.display()))?;

    Ok(MaterializedArtifact {
        path,
        digest: digest_bytes(&content),
    })
}

/// 重新載入排程檔案，雜湊不符或內容不合理時回傳錯誤
pub fn load_schedule_artifact(path: &Path, expected_digest: &str) -> Result<MasterSchedule> {
    let content =
        fs::read(path).with_context(|| format!("無法讀取排程檔案: {}", path.display()))?;

    let digest = digest_bytes(&content);
    if digest != expected_digest {
        bail!(
            "排程檔案雜湊不符: {} (預期 {expected_digest}，實際 {digest})",
            path.display()
        );
    }

    let schedule: MasterSchedule = serde_json::from_slice(&content)
        .with_context(|| format!("無法解析排程檔案: {}", path.display()))?;
    verify_schedule(&schedule)?;

    Ok(schedule)
}

/// 檢查排程的基本不變式
pub fn verify_schedule(schedule: &MasterSchedule) -> Result<()> {
    if schedule.segments.is_empty() {
        bail!("排程沒有任何片段");
    }
    if !(schedule.frame_rate.is_finite() && schedule.frame_rate > 0.0) {
        bail!("排程的影格率無效: {}", schedule.frame_rate);
    }
    if !(schedule.total_duration.is_finite() && schedule.total_duration > 0.0) {
        bail!("排程的總長度無效: {}", schedule.total_duration);
    }

    for channel in &schedule.channels {
        for pair in channel.clips.windows(2) {
            if pair[1].start < pair[0].end() - TIME_EPSILON {
                bail!("通道 {} 的片段重疊", channel.key);
            }
        }
        if let Some(clip) = channel
            .clips
            .iter()
            .find(|c| c.segment_index >= schedule.segments.len())
        {
            bail!(
                "通道 {} 的片段指向不存在的片段 [{}]",
                channel.key,
                clip.segment_index
            );
        }
    }

    if let Some(last) = schedule.segments.last() {
        if last.end() > schedule.total_duration + TIME_EPSILON {
            bail!("最後一個片段超出排程總長度");
        }
    }

    Ok(())
}

/// 以 JSON 檔案保存主排程，並以 BLAKE3 雜湊驗證
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonScheduleMaterializer;

impl ScheduleMaterializer for JsonScheduleMaterializer {
    fn materialize(
        &mut self,
        schedule: &MasterSchedule,
        run_dir: &Path,
    ) -> Result<MaterializedArtifact> {
        write_schedule_artifact(schedule, run_dir)
    }

    fn load_and_verify(&self, artifact: &MaterializedArtifact) -> Result<MasterSchedule> {
        load_schedule_artifact(&artifact.path, &artifact.digest)
    }
}
