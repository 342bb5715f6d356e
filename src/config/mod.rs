pub mod load;
pub mod save;
pub mod types;

pub use types::{Config, HostMode, Language, MAX_RECENT_PATHS, RecordingSettings, UserSettings};
