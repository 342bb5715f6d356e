//! 錄製流程控制元件
//!
//! 以可輪詢的狀態機驅動一次錄製：建構主排程、寫出並驗證排程檔案、
//! 交給執行環境播放，再依進度通道的回報收尾

mod collaborators;
mod controller;
mod host;
mod state;

pub use collaborators::{ExecutionHost, MaterializedArtifact, ScheduleMaterializer};
pub use controller::{ControllerOptions, DEFAULT_HANDOFF_TIMEOUT, ExecutionController};
pub use host::{ProcessHost, ThreadHost};
pub use state::{ExecutionState, RunOutcome};
