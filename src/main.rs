use anyhow::Result;
use clap::Parser;
use console::{Term, style};
use log::{info, warn};
use rust_i18n::t;
use sequence_batch_recorder::component::BatchRecorder;
use sequence_batch_recorder::component::execution_context::{
    PlaybackOutcome, run_execution_context,
};
use sequence_batch_recorder::config::types::Config;
use sequence_batch_recorder::init;
use sequence_batch_recorder::menu::show_main_menu;
use sequence_batch_recorder::signal::setup_shutdown_signal;
use std::path::PathBuf;

#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en-US");

/// 多序列批次錄製工具
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// 以執行環境模式播放進度通道中的錄製（由錄製器自動啟動）
    #[arg(long, value_name = "CHANNEL_DIR", conflicts_with_all = ["catalog", "plan"])]
    execute: Option<PathBuf>,

    /// 序列目錄檔案，與 --plan 一起使用時不顯示選單直接錄製
    #[arg(long, value_name = "FILE", requires = "plan")]
    catalog: Option<PathBuf>,

    /// 錄製計畫檔案
    #[arg(long, value_name = "FILE", requires = "catalog")]
    plan: Option<PathBuf>,
}

fn main() -> Result<()> {
    init::init();
    let cli = Cli::parse();
    let shutdown_signal = setup_shutdown_signal();

    if let Some(channel_dir) = cli.execute {
        return match run_execution_context(&channel_dir, &shutdown_signal)? {
            PlaybackOutcome::Completed { frames } => {
                info!("執行環境結束：完成 {frames} 格");
                Ok(())
            }
            PlaybackOutcome::Interrupted { frames } => {
                warn!("執行環境結束：於第 {frames} 格中斷");
                Ok(())
            }
        };
    }

    let mut config = Config::new()?;
    rust_i18n::set_locale(config.settings.language.as_str());

    if let (Some(catalog), Some(plan)) = (cli.catalog, cli.plan) {
        let recorder = BatchRecorder::new(config, shutdown_signal);
        let summary = recorder.record(&catalog, &plan)?;
        if let Some(error) = summary.error {
            anyhow::bail!(error);
        }
        info!(
            "批次錄製結束: {}",
            summary
                .outcome
                .map_or_else(|| "未開始".to_string(), |o| o.to_string())
        );
        return Ok(());
    }

    let term = Term::stdout();
    loop {
        match show_main_menu(&term, &shutdown_signal, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style(t!("main_menu.goodbye")).green().bold());
                info!("Program exited normally");
                break;
            }
            Err(e) => {
                warn!("Program error: {e}");
                eprintln!("{} {}", style(t!("main_menu.error_prefix")).red().bold(), e);
                break;
            }
        }
    }

    Ok(())
}
