use crate::component::schedule_builder::{
    CaptureSettings, Channel, PlacedClip, Resolution, TaskKind, expand_frame,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 單一錄製片段的輸出紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureManifest {
    pub run_id: Uuid,
    pub channel: String,
    pub kind: TaskKind,
    pub target: Option<String>,
    pub sequence_id: String,
    pub sequence_name: String,
    pub take: u32,
    pub output_name: String,
    pub frame_rate: f64,
    pub resolution: Resolution,
    pub first_frame: u64,
    pub frame_count: u64,
    pub start_local_time: f64,
    pub end_local_time: f64,
    pub files: Vec<String>,
    /// 中斷時為 false，已錄到的部分仍會保留
    pub complete: bool,
}

/// 播放中累積的片段錄製狀態
#[derive(Debug, Clone)]
pub struct ClipCapture {
    pub clip_index: usize,
    pub first_frame: u64,
    pub frame_count: u64,
    pub start_local_time: f64,
    pub end_local_time: f64,
    pub files: Vec<String>,
}

impl ClipCapture {
    #[must_use]
    pub const fn new(clip_index: usize, first_frame: u64, local_time: f64) -> Self {
        Self {
            clip_index,
            first_frame,
            frame_count: 0,
            start_local_time: local_time,
            end_local_time: local_time,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, clip: &PlacedClip, local_time: f64) {
        let clip_frame = self.frame_count;
        self.frame_count += 1;
        self.end_local_time = local_time;

        match &clip.settings {
            CaptureSettings::ImageSequence { format, .. } => {
                // 樣板沒有 `<Frame>` 時把影格編號接在最後
                let name = if clip.output_name.contains("<Frame>") {
                    expand_frame(&clip.output_name, clip_frame)
                } else {
                    format!("{}_{clip_frame:04}", clip.output_name)
                };
                self.files.push(format!("{name}.{format}"));
            }
            settings if self.files.is_empty() => {
                self.files
                    .push(format!("{}.{}", clip.output_name, settings.extension()));
            }
            _ => {}
        }
    }
}

/// 紀錄檔名：去掉 `<Frame>` 後的輸出名稱
#[must_use]
pub fn manifest_path(clip: &PlacedClip) -> PathBuf {
    let stem = clip.output_name.replace("<Frame>", "");
    let stem = stem.trim_end_matches(['_', '-', '.', ' ']);
    let stem = if stem.is_empty() { "capture" } else { stem };
    clip.output_path.join(format!("{stem}.manifest.json"))
}

pub fn write_manifest(manifest: &CaptureManifest, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("無法建立輸出資料夾: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(manifest).context("無法序列化錄製紀錄")?;
    fs::write(path, content)
        .with_context(|| format!("無法寫入錄製紀錄: {}", path.display()))
}

pub fn read_manifest(path: &Path) -> Result<CaptureManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("無法讀取錄製紀錄: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("無法解析錄製紀錄: {}", path.display()))
}

/// 組合片段的錄製紀錄
#[must_use]
pub fn build_manifest(
    run_id: Uuid,
    channel: &Channel,
    sequence: (&str, &str),
    capture: ClipCapture,
    frame_rate: f64,
    resolution: Resolution,
    complete: bool,
) -> CaptureManifest {
    let clip = &channel.clips[capture.clip_index];
    CaptureManifest {
        run_id,
        channel: channel.handle.label.clone(),
        kind: channel.key.kind,
        target: channel.key.target.clone(),
        sequence_id: sequence.0.to_string(),
        sequence_name: sequence.1.to_string(),
        take: clip.take,
        output_name: clip.output_name.clone(),
        frame_rate,
        resolution,
        first_frame: capture.first_frame,
        frame_count: capture.frame_count,
        start_local_time: capture.start_local_time,
        end_local_time: capture.end_local_time,
        files: capture.files,
        complete,
    }
}
