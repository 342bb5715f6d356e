//! 批次錄製主模組
//!
//! 載入序列目錄與錄製計畫，以固定間隔推進控制器並顯示進度

use crate::component::execution_controller::{
    ExecutionController, ExecutionHost, ExecutionState, ProcessHost, RunOutcome, ThreadHost,
};
use crate::component::progress_channel::ProgressChannel;
use crate::config::Config;
use crate::config::save::{add_recent_path, save_settings};
use crate::config::types::{HostMode, RecordingSettings};
use crate::signal::reset_shutdown_signal;
use crate::tools::{
    JsonScheduleMaterializer, RecordingPlan, SequenceCatalog, remove_all_runs,
    validate_file_exists,
};
use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// 進度條的刻度數
const PROGRESS_SCALE: u64 = 1000;

/// 一次批次錄製的結果
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcome: Option<RunOutcome>,
    pub segment_count: usize,
    pub clip_count: usize,
    pub total_duration: f64,
    pub warnings: Vec<String>,
    pub missing_sequences: Vec<String>,
    pub error: Option<String>,
    /// 錄製完成後是否已寫回遞增的 take 編號
    pub plan_updated: bool,
}

impl BatchSummary {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == Some(RunOutcome::Completed)
    }
}

/// 批次錄製器
pub struct BatchRecorder {
    config: Config,
    shutdown_signal: Arc<AtomicBool>,
}

impl BatchRecorder {
    pub fn new(config: Config, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    /// 目前的設定（互動流程會更新最近使用的路徑）
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// 互動式流程：選擇目錄與計畫、預覽、確認後錄製
    pub fn run(&mut self) -> Result<()> {
        println!("{}", style("=== 多序列批次錄製 ===").cyan().bold());

        let Some(catalog_path) = self.prompt_catalog_path()? else {
            return Ok(());
        };
        validate_file_exists(&catalog_path)?;

        let plan_path = self.prompt_plan_path()?;

        let catalog = SequenceCatalog::load_from_file(&catalog_path)?;
        let plan = RecordingPlan::load_from_file(&plan_path)?;

        self.remember_catalog(&catalog_path)?;
        self.display_plan(&catalog, &plan);

        if plan.enabled_task_count() == 0 {
            println!("{}", style("沒有可錄製的項目").yellow());
            return Ok(());
        }

        if !self.confirm_record()? {
            println!("{}", style("操作已取消").yellow());
            return Ok(());
        }

        let summary = self.record(&catalog_path, &plan_path)?;
        self.display_summary(&summary);

        Ok(())
    }

    /// 非互動式錄製；完成時把遞增後的 take 編號寫回計畫檔
    pub fn record(&self, catalog_path: &Path, plan_path: &Path) -> Result<BatchSummary> {
        let settings = &self.config.settings.recording;
        let catalog = SequenceCatalog::load_from_file(catalog_path)?;
        let mut plan = RecordingPlan::load_from_file(plan_path)?;

        let (sequences, missing_sequences) = plan.selected_sequences(&catalog);
        for id in &missing_sequences {
            warn!("序列目錄中找不到序列: {id}");
        }

        reset_shutdown_signal(&self.shutdown_signal);

        let mut controller = ExecutionController::new(
            settings.controller_options(),
            Box::new(JsonScheduleMaterializer),
            create_host(settings.host_mode)?,
        )?;

        let mut summary = BatchSummary {
            missing_sequences,
            ..BatchSummary::default()
        };

        if !controller.start(sequences, plan.tasks.clone()) {
            info!("{}", controller.status());
            summary.error = Some(controller.status().to_string());
            return Ok(summary);
        }

        self.drive(&mut controller, settings);

        if let Some(schedule) = controller.schedule() {
            summary.segment_count = schedule.segments.len();
            summary.clip_count = schedule.clip_count();
            summary.total_duration = schedule.total_duration;
        }
        summary.warnings = controller.warnings().to_vec();
        summary.outcome = controller.outcome();
        summary.error = controller.last_error().map(ToString::to_string);

        if let Some(tasks) = controller.take_updated_tasks() {
            plan.tasks = tasks;
            plan.save_to_file(plan_path)?;
            summary.plan_updated = true;
            info!("已更新錄製計畫: {}", plan_path.display());
        }

        Ok(summary)
    }

    /// 推進控制器直到回到 `Idle` 或進入 `Error`
    fn drive(&self, controller: &mut ExecutionController, settings: &RecordingSettings) {
        let progress_bar = ProgressBar::new(PROGRESS_SCALE);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        loop {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                controller.stop();
                progress_bar.abandon_with_message("錄製已中斷");
                break;
            }

            let state = controller.tick();
            let position = (controller.progress().fraction * PROGRESS_SCALE as f64).round() as u64;
            progress_bar.set_position(position.min(PROGRESS_SCALE));
            progress_bar.set_message(format!("[{state}] {}", controller.status()));

            match state {
                ExecutionState::Idle => {
                    if controller.outcome() == Some(RunOutcome::Completed) {
                        progress_bar.set_position(PROGRESS_SCALE);
                        progress_bar.finish_with_message("完成");
                    } else {
                        progress_bar.abandon_with_message(controller.status().to_string());
                    }
                    break;
                }
                ExecutionState::Error => {
                    progress_bar.abandon_with_message("錄製失敗");
                    break;
                }
                ExecutionState::Preparing
                | ExecutionState::PreparingAssets
                | ExecutionState::SavingAssets
                | ExecutionState::Complete => {}
                ExecutionState::AwaitingExecutionContext | ExecutionState::Executing => {
                    thread::sleep(settings.poll_interval());
                }
            }
        }
    }

    fn prompt_catalog_path(&self) -> Result<Option<PathBuf>> {
        let recent_paths = &self.config.settings.recent_paths;
        let default_path = self
            .config
            .settings
            .recording
            .catalog_path
            .to_string_lossy()
            .to_string();

        if recent_paths.is_empty() {
            let path: String = Input::new()
                .with_prompt("請輸入序列目錄檔案路徑")
                .default(default_path)
                .interact_text()?;
            return Ok(Some(PathBuf::from(path.trim())));
        }

        let mut options: Vec<String> = recent_paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let indicator = if Path::new(p).exists() { "✓" } else { "✗" };
                format!("{} [{}] {}", i + 1, indicator, p)
            })
            .collect();
        options.push("輸入新路徑...".to_string());

        println!("{}", style("(按 ESC 返回主選單)").dim());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("請選擇序列目錄")
            .items(&options)
            .default(0)
            .interact_opt()?;

        match selection {
            None => Ok(None),
            Some(idx) if idx < recent_paths.len() => Ok(Some(PathBuf::from(&recent_paths[idx]))),
            Some(_) => {
                let path: String = Input::new()
                    .with_prompt("請輸入序列目錄檔案路徑")
                    .default(default_path)
                    .interact_text()?;
                Ok(Some(PathBuf::from(path.trim())))
            }
        }
    }

    fn prompt_plan_path(&self) -> Result<PathBuf> {
        let default_path = self
            .config
            .settings
            .recording
            .plan_path
            .to_string_lossy()
            .to_string();
        let path: String = Input::new()
            .with_prompt("請輸入錄製計畫檔案路徑")
            .default(default_path)
            .interact_text()?;
        Ok(PathBuf::from(path.trim()))
    }

    fn remember_catalog(&mut self, catalog_path: &Path) -> Result<()> {
        add_recent_path(
            &mut self.config.settings,
            &catalog_path.to_string_lossy(),
        );
        save_settings(&self.config.settings)
    }

    fn confirm_record(&self) -> Result<bool> {
        let confirmed = Confirm::new()
            .with_prompt("確定要開始錄製嗎？")
            .default(true)
            .interact()?;
        Ok(confirmed)
    }

    fn display_plan(&self, catalog: &SequenceCatalog, plan: &RecordingPlan) {
        println!();
        println!("{}", style("錄製順序：").cyan());

        for (i, id) in plan.selected.iter().enumerate() {
            let Some(sequence) = catalog.get(id) else {
                println!(
                    "  {} {}",
                    style(format!("[{}]", i + 1)).dim(),
                    style(format!("{id}（目錄中找不到）")).red()
                );
                continue;
            };

            let tasks = plan.tasks.get(id).map(Vec::as_slice).unwrap_or_default();
            let enabled = tasks.iter().filter(|t| t.enabled).count();
            println!(
                "  {} {} ({}) - {} 個任務",
                style(format!("[{}]", i + 1)).dim(),
                sequence.name,
                style(format_duration(sequence.duration)).cyan(),
                enabled
            );
            for task in tasks.iter().filter(|t| t.enabled) {
                println!(
                    "      {} {} take {:03}",
                    style("•").dim(),
                    task.channel_key(),
                    task.take
                );
            }
        }
        println!();
    }

    fn display_summary(&self, summary: &BatchSummary) {
        println!();
        println!("{}", style("=== 錄製結果 ===").cyan().bold());

        match summary.outcome {
            Some(RunOutcome::Completed) => {
                println!("  結果: {}", style(RunOutcome::Completed).green());
            }
            Some(RunOutcome::UserInterruption) => {
                println!("  結果: {}", style(RunOutcome::UserInterruption).yellow());
            }
            Some(RunOutcome::Failed) => {
                println!("  結果: {}", style(RunOutcome::Failed).red());
            }
            None => println!("  結果: {}", style("未開始").yellow()),
        }

        println!("  序列: {} 個", style(summary.segment_count).green());
        println!("  片段: {} 個", style(summary.clip_count).green());
        println!(
            "  總長度: {}",
            style(format_duration(summary.total_duration)).cyan()
        );

        if !summary.missing_sequences.is_empty() {
            println!(
                "  找不到的序列: {}",
                style(summary.missing_sequences.join(", ")).yellow()
            );
        }
        for warning in &summary.warnings {
            println!("  {} {}", style("警告:").yellow(), warning);
        }
        if let Some(error) = &summary.error {
            println!("  {} {}", style("錯誤:").red().bold(), error);
        }
        if summary.plan_updated {
            println!("  {}", style("已更新 take 編號").dim());
        }
    }
}

fn create_host(mode: HostMode) -> Result<Box<dyn ExecutionHost>> {
    Ok(match mode {
        HostMode::Process => Box::new(ProcessHost::current_executable()?),
        HostMode::Thread => Box::new(ThreadHost::new()),
    })
}

/// 清除殘留的進度通道與錄製暫存檔案，回傳刪除的檔案數
pub fn clean_work_dir(settings: &RecordingSettings) -> Result<usize> {
    let options = settings.controller_options();
    let channel_dir = options.channel_dir();
    if channel_dir.exists() {
        ProgressChannel::open(&channel_dir)?.clear()?;
    }
    remove_all_runs(&options.runs_dir())
}

/// 格式化時長為人類可讀格式
fn format_duration(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let total_seconds = total_millis / 1000;
    let millis = total_millis % 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
    } else {
        format!("{minutes:02}:{secs:02}.{millis:03}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(3.5), "00:03.500");
        assert_eq!(format_duration(125.0), "02:05.000");
        assert_eq!(format_duration(3661.25), "01:01:01.250");
        assert_eq!(format_duration(-1.0), "00:00.000");
    }

    #[test]
    fn test_clean_work_dir() {
        let dir = tempdir().unwrap();
        let settings = RecordingSettings {
            work_dir: dir.path().to_path_buf(),
            ..RecordingSettings::default()
        };
        let options = settings.controller_options();

        let channel = ProgressChannel::open(&options.channel_dir()).unwrap();
        channel.set_alive().unwrap();
        let run_dir = options.runs_dir().join("stale");
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(run_dir.join("schedule.json"), "{}").unwrap();

        assert_eq!(clean_work_dir(&settings).unwrap(), 1);
        assert!(!channel.is_alive());
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_clean_empty_work_dir() {
        let dir = tempdir().unwrap();
        let settings = RecordingSettings {
            work_dir: dir.path().join("never-used"),
            ..RecordingSettings::default()
        };

        assert_eq!(clean_work_dir(&settings).unwrap(), 0);
    }
}
