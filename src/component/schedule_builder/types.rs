use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 比較時間用的容許誤差（秒）
pub const TIME_EPSILON: f64 = 1e-9;

/// 序列上的命名時間標記
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub time: f64,
}

/// 外部目錄提供的獨立時間序列，錄製期間不可變
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    /// 長度（秒）
    pub duration: f64,
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// 序列實際播放的內容；為 `None` 時該序列無法錄製
    #[serde(default)]
    pub content: Option<String>,
}

impl Sequence {
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
            && self.duration.is_finite()
            && self.duration > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Movie,
    ImageSequence,
    Animation,
    Audio,
    Mesh,
}

impl TaskKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::ImageSequence => "ImageSequence",
            Self::Animation => "Animation",
            Self::Audio => "Audio",
            Self::Mesh => "Mesh",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 各種錄製類型的專屬設定，類型由變體本身決定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureSettings {
    Movie {
        container: String,
        #[serde(default)]
        include_audio: bool,
    },
    ImageSequence {
        format: String,
        #[serde(default)]
        include_alpha: bool,
    },
    Animation {
        #[serde(default)]
        recursive: bool,
    },
    Audio {
        format: String,
    },
    Mesh {
        format: String,
    },
}

impl CaptureSettings {
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Movie { .. } => TaskKind::Movie,
            Self::ImageSequence { .. } => TaskKind::ImageSequence,
            Self::Animation { .. } => TaskKind::Animation,
            Self::Audio { .. } => TaskKind::Audio,
            Self::Mesh { .. } => TaskKind::Mesh,
        }
    }

    /// 輸出檔案的副檔名（不含前導點）
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Movie { container, .. } => container,
            Self::ImageSequence { format, .. } => format,
            Self::Animation { .. } => "anim",
            Self::Audio { format } | Self::Mesh { format } => format,
        }
    }
}

/// 輸出路徑規則
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PathPolicy {
    #[default]
    Global,
    RelativeToGlobal {
        sub_path: String,
    },
    Custom {
        path: String,
    },
}

const fn default_take() -> u32 {
    1
}

const fn default_enabled() -> bool {
    true
}

/// 單一錄製任務的描述，錄製開始後不再變動
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTaskDescriptor {
    #[serde(default)]
    pub target: Option<String>,
    pub settings: CaptureSettings,
    #[serde(default = "default_take")]
    pub take: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 未設定時使用全域命名樣板
    #[serde(default)]
    pub naming_template: Option<String>,
    #[serde(default)]
    pub path_policy: PathPolicy,
}

impl CaptureTaskDescriptor {
    #[must_use]
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            target: None,
            settings,
            take: default_take(),
            enabled: true,
            naming_template: None,
            path_policy: PathPolicy::Global,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.settings.kind()
    }

    #[must_use]
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey {
            kind: self.kind(),
            target: self.target.clone(),
        }
    }
}

/// 序列 id → 該序列的錄製任務
pub type TaskTable = BTreeMap<String, Vec<CaptureTaskDescriptor>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 起訖標記名稱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerNames {
    pub start: String,
    pub end: String,
}

impl Default for MarkerNames {
    fn default() -> Self {
        Self {
            start: "RecordStart".to_string(),
            end: "RecordEnd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordingRange {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub is_valid: bool,
}

impl RecordingRange {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            duration: end - start,
            is_valid: true,
        }
    }

    /// 整段序列；標記為無效代表並未使用標記範圍
    #[must_use]
    pub fn full(sequence: &Sequence) -> Self {
        Self {
            start: 0.0,
            end: sequence.duration,
            duration: sequence.duration,
            is_valid: false,
        }
    }
}

/// 多工的依據：相同類型與目標的任務共用同一個通道
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub kind: TaskKind,
    pub target: Option<String>,
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}@{}", self.kind, target),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WarmupMode {
    /// 從 `from` 開始以正常速度播放，銜接錄製範圍
    Seek { from: f64 },
    /// 停在時間 0，幾乎不前進
    Freeze,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupSpan {
    pub start: f64,
    pub duration: f64,
    pub mode: WarmupMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MainSpan {
    pub start: f64,
    pub duration: f64,
    /// 序列內部的播放起點
    pub playback_offset: f64,
}

impl MainSpan {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedSegment {
    pub sequence_id: String,
    pub sequence_name: String,
    pub warmup: Option<WarmupSpan>,
    pub main: MainSpan,
}

impl PlacedSegment {
    /// 含預熱的起點
    #[must_use]
    pub fn start(&self) -> f64 {
        self.warmup.map_or(self.main.start, |w| w.start)
    }

    #[must_use]
    pub fn end(&self) -> f64 {
        self.main.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedClip {
    pub segment_index: usize,
    pub start: f64,
    pub duration: f64,
    pub channel_ref: usize,
    pub take: u32,
    pub output_name: String,
    pub output_path: PathBuf,
    pub settings: CaptureSettings,
}

impl PlacedClip {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    #[must_use]
    pub fn contains(&self, time: f64) -> bool {
        time + TIME_EPSILON >= self.start && time < self.end() - TIME_EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub key: ChannelKey,
    pub handle: ChannelHandle,
    pub clips: Vec<PlacedClip>,
}

/// 整批錄製的主排程，開始執行後不再變動
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSchedule {
    pub segments: Vec<PlacedSegment>,
    /// 依建立順序排列的通道
    pub channels: Vec<Channel>,
    pub total_duration: f64,
    pub frame_rate: f64,
    pub warmup_duration: f64,
    pub margin_duration: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl MasterSchedule {
    #[must_use]
    pub fn channel(&self, key: &ChannelKey) -> Option<&Channel> {
        self.channels.iter().find(|c| &c.key == key)
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.channels.iter().map(|c| c.clips.len()).sum()
    }

    #[must_use]
    pub fn frame_duration(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// 播放整份排程需要的影格數
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        let frames = (self.total_duration * self.frame_rate - TIME_EPSILON).ceil();
        if frames.is_finite() && frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    /// 指定主排程時間所在的片段
    #[must_use]
    pub fn segment_at(&self, time: f64) -> Option<(usize, &PlacedSegment)> {
        self.segments
            .iter()
            .enumerate()
            .find(|(_, s)| time + TIME_EPSILON >= s.start() && time < s.end() - TIME_EPSILON)
    }
}
