use super::collaborators::ExecutionHost;
use crate::component::execution_context::run_execution_context;
use anyhow::{Context, Result, bail};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 拆除前等待執行環境自行結束的時間
const GRACEFUL_HALT_TIMEOUT: Duration = Duration::from_secs(3);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 以子行程啟動執行環境：`<executable> --execute <channel_dir>`
pub struct ProcessHost {
    executable: PathBuf,
    child: Option<Child>,
}

impl ProcessHost {
    #[must_use]
    pub const fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            child: None,
        }
    }

    /// 使用目前執行檔作為執行環境
    pub fn current_executable() -> Result<Self> {
        let executable = std::env::current_exe().context("無法取得目前執行檔路徑")?;
        Ok(Self::new(executable))
    }

    fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    warn!("無法檢查執行環境狀態 [{}]: {e}", child.id());
                    return false;
                }
            }
        }
        false
    }
}

impl ExecutionHost for ProcessHost {
    fn launch(&mut self, channel_dir: &Path) -> Result<()> {
        if self.child.is_some() {
            bail!("執行環境已在運作中");
        }

        let child = Command::new(&self.executable)
            .arg("--execute")
            .arg(channel_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("無法啟動執行環境: {}", self.executable.display()))?;

        info!("啟動執行環境 [{}]: {}", child.id(), channel_dir.display());
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                info!("執行環境已結束 [{}]: {status}", child.id());
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("無法檢查執行環境狀態 [{}]: {e}", child.id());
                false
            }
        }
    }

    fn teardown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        let pid = child.id();
        if Self::wait_for_exit(&mut child, GRACEFUL_HALT_TIMEOUT) {
            info!("執行環境已停止 [{pid}]");
            return;
        }

        warn!("執行環境未在時限內停止，強制終止 [{pid}]");
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// 在同一個行程的獨立執行緒中啟動執行環境
///
/// 執行緒只拿到通道資料夾的路徑與自己的停止旗標，與控制器之間沒有其他共享狀態。
#[derive(Default)]
pub struct ThreadHost {
    handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
}

impl ThreadHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionHost for ThreadHost {
    fn launch(&mut self, channel_dir: &Path) -> Result<()> {
        if self.handle.is_some() {
            bail!("執行環境已在運作中");
        }

        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_signal = Arc::clone(&stop_signal);
        let channel_dir = channel_dir.to_path_buf();

        let handle = thread::Builder::new()
            .name("execution-context".to_string())
            .spawn(move || {
                if let Err(e) = run_execution_context(&channel_dir, &thread_signal) {
                    warn!("執行環境結束並回報錯誤: {e:#}");
                }
            })
            .context("無法建立執行環境執行緒")?;

        self.stop_signal = stop_signal;
        self.handle = Some(handle);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn teardown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop_signal.store(true, Ordering::SeqCst);
        if handle.join().is_err() {
            warn!("執行環境執行緒異常結束");
        }
    }
}
