//! 功能元件模組
//!
//! 每個子模組實現錄製流程中的一個獨立部分

pub mod batch_recorder;
pub mod execution_context;
pub mod execution_controller;
pub mod progress_channel;
pub mod schedule_builder;

pub use batch_recorder::BatchRecorder;
pub use execution_controller::ExecutionController;
