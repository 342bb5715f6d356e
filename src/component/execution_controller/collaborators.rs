//! 控制器的外部協作者介面

use crate::component::schedule_builder::MasterSchedule;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// 已寫出的排程檔案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedArtifact {
    pub path: PathBuf,
    /// 檔案內容的 BLAKE3 雜湊（十六進位）
    pub digest: String,
}

/// 將主排程寫成可重播的檔案，再重新載入驗證
pub trait ScheduleMaterializer {
    fn materialize(&mut self, schedule: &MasterSchedule, run_dir: &Path)
    -> Result<MaterializedArtifact>;

    fn load_and_verify(&self, artifact: &MaterializedArtifact) -> Result<MasterSchedule>;
}

/// 啟動與拆除執行環境
///
/// 執行環境與控制器之間只透過進度通道溝通，`launch` 只會拿到通道資料夾的路徑。
pub trait ExecutionHost {
    fn launch(&mut self, channel_dir: &Path) -> Result<()>;

    /// 執行環境是否仍在運作
    fn is_running(&mut self) -> bool;

    /// 停止執行環境；重複呼叫不會出錯
    fn teardown(&mut self);
}
