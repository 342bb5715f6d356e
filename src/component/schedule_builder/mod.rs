//! 主排程建構元件
//!
//! 將多個獨立序列依序排成單一主排程，並把相同類型與目標的錄製任務多工到同一個通道

mod builder;
mod channel_registry;
mod range_resolver;
mod types;
mod wildcard;

pub use builder::{ScheduleParams, build_schedule};
pub use channel_registry::{ChannelFactory, ChannelRegistry, TrackChannelFactory};
pub use range_resolver::resolve_range;
pub use types::{
    CaptureSettings, CaptureTaskDescriptor, Channel, ChannelHandle, ChannelKey, MainSpan, Marker,
    MarkerNames, MasterSchedule, PathPolicy, PlacedClip, PlacedSegment, RecordingRange,
    Resolution, Sequence, TIME_EPSILON, TaskKind, TaskTable, WarmupMode, WarmupSpan,
};
pub use wildcard::{WildcardContext, expand_frame};
