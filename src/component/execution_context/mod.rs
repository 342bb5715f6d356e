//! 執行環境
//!
//! 以獨立行程（或測試時的獨立執行緒）播放已寫出的主排程

mod capture_manifest;
mod player;

pub use capture_manifest::{CaptureManifest, manifest_path, read_manifest};
pub use player::{PlaybackOutcome, Playhead, SchedulePlayer, locate, run_execution_context};
