//! 多序列批次錄製元件
//!
//! 讀取序列目錄與錄製計畫，驅動錄製控制器並顯示進度

mod main;

pub use main::{BatchRecorder, BatchSummary, clean_work_dir};
