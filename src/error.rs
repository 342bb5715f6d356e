//! 錄製流程的錯誤分類
//!
//! 建構期錯誤會讓整批錄製進入 `Error` 狀態；使用者中斷不是錯誤，
//! 由 `RunOutcome::UserInterruption` 表示。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// 沒有可錄製的片段或任務，或全域參數無效
    #[error("無法建立錄製排程: {0}")]
    Construction(String),

    /// 要求使用標記範圍但找不到標記，且不允許退回完整長度
    #[error("序列 `{sequence}` 找不到標記範圍 `{start_marker}` → `{end_marker}`")]
    RangeNotFound {
        sequence: String,
        start_marker: String,
        end_marker: String,
    },

    /// 排程檔案寫入後無法重新載入或驗證
    #[error("排程檔案驗證失敗: {0}")]
    Materialization(String),

    /// 執行環境沒有接手
    #[error("執行環境未能接手: {0}")]
    ExecutionHandoff(String),

    /// 執行環境回報的內部錯誤
    #[error("執行期間發生錯誤: {0}")]
    ExecutionFault(String),
}

pub type RecorderResult<T> = std::result::Result<T, RecorderError>;
