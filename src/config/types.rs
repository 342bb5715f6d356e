use crate::component::execution_controller::{ControllerOptions, DEFAULT_HANDOFF_TIMEOUT};
use crate::component::schedule_builder::{MarkerNames, Resolution, ScheduleParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_RECENT_PATHS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnUs => write!(f, "English"),
            Self::ZhTw => write!(f, "繁體中文"),
        }
    }
}

/// 執行環境的啟動方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostMode {
    /// 以 `--execute` 啟動目前執行檔的子行程
    #[default]
    Process,
    /// 在同一個行程的獨立執行緒中執行
    Thread,
}

impl fmt::Display for HostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "子行程"),
            Self::Thread => write!(f, "執行緒"),
        }
    }
}

/// 錄製參數；預熱與間隔以影格數設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub frame_rate: f64,
    pub resolution: Resolution,
    pub warmup_frames: u32,
    pub margin_frames: u32,
    pub start_marker: String,
    pub end_marker: String,
    pub use_marker_ranges: bool,
    pub allow_range_fallback: bool,
    pub naming_template: String,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub retain_temp_artifacts: bool,
    pub handoff_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub user_tokens: BTreeMap<String, String>,
    pub host_mode: HostMode,
    pub catalog_path: PathBuf,
    pub plan_path: PathBuf,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        let markers = MarkerNames::default();
        let params = ScheduleParams::default();
        Self {
            frame_rate: params.frame_rate,
            resolution: Resolution::default(),
            warmup_frames: 0,
            margin_frames: 0,
            start_marker: markers.start,
            end_marker: markers.end,
            use_marker_ranges: true,
            allow_range_fallback: params.allow_range_fallback,
            naming_template: params.default_naming_template,
            output_dir: params.global_output_dir,
            work_dir: PathBuf::from(".recorder"),
            retain_temp_artifacts: false,
            handoff_timeout_secs: DEFAULT_HANDOFF_TIMEOUT.as_secs(),
            poll_interval_ms: 100,
            user_tokens: BTreeMap::new(),
            host_mode: HostMode::default(),
            catalog_path: PathBuf::from("catalog.json"),
            plan_path: PathBuf::from("plan.json"),
        }
    }
}

impl RecordingSettings {
    /// 影格數換算成秒
    fn frames_to_secs(&self, frames: u32) -> f64 {
        if self.frame_rate > 0.0 {
            f64::from(frames) / self.frame_rate
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn schedule_params(&self) -> ScheduleParams {
        ScheduleParams {
            warmup_duration: self.frames_to_secs(self.warmup_frames),
            margin_duration: self.frames_to_secs(self.margin_frames),
            frame_rate: self.frame_rate,
            markers: MarkerNames {
                start: self.start_marker.clone(),
                end: self.end_marker.clone(),
            },
            use_marker_ranges: self.use_marker_ranges,
            allow_range_fallback: self.allow_range_fallback,
            global_output_dir: self.output_dir.clone(),
            default_naming_template: self.naming_template.clone(),
        }
    }

    #[must_use]
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            schedule: self.schedule_params(),
            resolution: self.resolution,
            user_tokens: self.user_tokens.clone(),
            work_dir: self.work_dir.clone(),
            handoff_timeout: Duration::from_secs(self.handoff_timeout_secs),
            retain_temp_artifacts: self.retain_temp_artifacts,
        }
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub language: Language,
    pub recording: RecordingSettings,
    pub recent_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: UserSettings,
}
