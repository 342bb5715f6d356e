use crate::component::BatchRecorder;
use crate::component::batch_recorder::clean_work_dir;
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn run_batch_recorder(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<()> {
    let mut recorder = BatchRecorder::new(config.clone(), Arc::clone(shutdown_signal));

    if let Err(e) = recorder.run() {
        eprintln!("{} {}", style(t!("common.error")).red().bold(), e);
    }

    config.clone_from(recorder.config());

    pause(term)?;
    Ok(())
}

pub fn run_clean_work_dir(term: &Term, config: &Config) -> Result<()> {
    match clean_work_dir(&config.settings.recording) {
        Ok(removed) => println!(
            "{}",
            style(t!("clean.done", count = removed)).green()
        ),
        Err(e) => eprintln!("{} {}", style(t!("common.error")).red().bold(), e),
    }

    pause(term)?;
    Ok(())
}
