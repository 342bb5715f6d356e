use crate::config::save::save_settings;
use crate::config::types::{Config, HostMode, Language, RecordingSettings};
use crate::menu::handlers::{run_batch_recorder, run_clean_work_dir};
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use rust_i18n::t;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_record"),
        t!("main_menu.opt_clean"),
        t!("main_menu.opt_settings"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_batch_recorder(term, shutdown_signal, config)?;
            Ok(true)
        }
        Some(1) => {
            run_clean_work_dir(term, config)?;
            Ok(true)
        }
        Some(2) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(3) | None => Ok(false),
        _ => unreachable!(),
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let options = vec![
            t!("settings.opt_timing"),
            t!("settings.opt_ranges"),
            t!("settings.opt_output"),
            t!("settings.opt_execution"),
            t!("settings.opt_language"),
            t!("settings.back"),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => edit_recording(term, config, edit_timing)?,
            Some(1) => edit_recording(term, config, edit_ranges)?,
            Some(2) => edit_recording(term, config, edit_output)?,
            Some(3) => edit_recording(term, config, edit_execution)?,
            Some(4) => show_language_menu(term, config)?,
            Some(5) | None => break,
            _ => unreachable!(),
        }
    }

    Ok(())
}

/// 在副本上編輯錄製參數，有變更時才存檔
fn edit_recording(
    term: &Term,
    config: &mut Config,
    edit: fn(&mut RecordingSettings) -> Result<()>,
) -> Result<()> {
    term.clear_screen()?;
    println!("{}", style(t!("settings.recording_title")).cyan().bold());

    let mut recording = config.settings.recording.clone();
    edit(&mut recording)?;

    if recording != config.settings.recording {
        config.settings.recording = recording;
        save_settings(&config.settings)?;
        println!("\n{}", style(t!("settings.saved")).green());
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

fn edit_timing(recording: &mut RecordingSettings) -> Result<()> {
    recording.frame_rate = Input::new()
        .with_prompt(t!("settings.frame_rate"))
        .default(recording.frame_rate)
        .validate_with(|v: &f64| {
            if v.is_finite() && *v > 0.0 {
                Ok(())
            } else {
                Err(t!("settings.frame_rate_invalid").to_string())
            }
        })
        .interact_text()?;
    recording.resolution.width = Input::new()
        .with_prompt(t!("settings.width"))
        .default(recording.resolution.width)
        .interact_text()?;
    recording.resolution.height = Input::new()
        .with_prompt(t!("settings.height"))
        .default(recording.resolution.height)
        .interact_text()?;
    recording.warmup_frames = Input::new()
        .with_prompt(t!("settings.warmup_frames"))
        .default(recording.warmup_frames)
        .interact_text()?;
    recording.margin_frames = Input::new()
        .with_prompt(t!("settings.margin_frames"))
        .default(recording.margin_frames)
        .interact_text()?;
    Ok(())
}

fn edit_ranges(recording: &mut RecordingSettings) -> Result<()> {
    recording.use_marker_ranges = Confirm::new()
        .with_prompt(t!("settings.use_marker_ranges"))
        .default(recording.use_marker_ranges)
        .interact()?;
    if !recording.use_marker_ranges {
        return Ok(());
    }

    recording.start_marker = Input::new()
        .with_prompt(t!("settings.start_marker"))
        .default(recording.start_marker.clone())
        .interact_text()?;
    recording.end_marker = Input::new()
        .with_prompt(t!("settings.end_marker"))
        .default(recording.end_marker.clone())
        .interact_text()?;
    recording.allow_range_fallback = Confirm::new()
        .with_prompt(t!("settings.allow_range_fallback"))
        .default(recording.allow_range_fallback)
        .interact()?;
    Ok(())
}

fn edit_output(recording: &mut RecordingSettings) -> Result<()> {
    recording.naming_template = Input::new()
        .with_prompt(t!("settings.naming_template"))
        .default(recording.naming_template.clone())
        .interact_text()?;
    let output_dir: String = Input::new()
        .with_prompt(t!("settings.output_dir"))
        .default(recording.output_dir.to_string_lossy().to_string())
        .interact_text()?;
    recording.output_dir = PathBuf::from(output_dir.trim());

    let user_tokens: String = Input::new()
        .with_prompt(t!("settings.user_tokens"))
        .default(format_user_tokens(recording))
        .allow_empty(true)
        .interact_text()?;
    recording.user_tokens = parse_user_tokens(&user_tokens);
    Ok(())
}

fn edit_execution(recording: &mut RecordingSettings) -> Result<()> {
    let modes = [HostMode::Process, HostMode::Thread];
    let items: Vec<String> = modes.iter().map(ToString::to_string).collect();
    let default_index = modes
        .iter()
        .position(|&m| m == recording.host_mode)
        .unwrap_or(0);
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.host_mode"))
        .items(&items)
        .default(default_index)
        .interact_opt()?;
    if let Some(index) = selection {
        recording.host_mode = modes[index];
    }

    let work_dir: String = Input::new()
        .with_prompt(t!("settings.work_dir"))
        .default(recording.work_dir.to_string_lossy().to_string())
        .interact_text()?;
    recording.work_dir = PathBuf::from(work_dir.trim());
    recording.handoff_timeout_secs = Input::new()
        .with_prompt(t!("settings.handoff_timeout"))
        .default(recording.handoff_timeout_secs)
        .interact_text()?;
    recording.poll_interval_ms = Input::new()
        .with_prompt(t!("settings.poll_interval"))
        .default(recording.poll_interval_ms)
        .interact_text()?;
    recording.retain_temp_artifacts = Confirm::new()
        .with_prompt(t!("settings.retain_temp"))
        .default(recording.retain_temp_artifacts)
        .interact()?;
    Ok(())
}

/// `Key=Value` 以逗號分隔
fn format_user_tokens(recording: &RecordingSettings) -> String {
    recording
        .user_tokens
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_user_tokens(input: &str) -> std::collections::BTreeMap<String, String> {
    input
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// 語言設定選單
fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let languages = [Language::EnUs, Language::ZhTw];
    let items: Vec<String> = languages.iter().map(ToString::to_string).collect();

    let default_index = languages
        .iter()
        .position(|&l| l == config.settings.language)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.language.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    let Some(selection) = selection else {
        return Ok(());
    };

    let selected_lang = languages[selection];

    if selected_lang != config.settings.language {
        config.settings.language = selected_lang;
        rust_i18n::set_locale(selected_lang.as_str());
        save_settings(&config.settings)?;
        println!(
            "\n{} {}",
            style(t!("settings.saved")).green(),
            selected_lang
        );
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_tokens() {
        let tokens = parse_user_tokens(" Project = Demo , broken, =skip,Shot=010");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["Project"], "Demo");
        assert_eq!(tokens["Shot"], "010");
    }

    #[test]
    fn test_format_user_tokens_round_trip() {
        let mut recording = RecordingSettings::default();
        recording
            .user_tokens
            .insert("Project".to_string(), "Demo".to_string());
        recording
            .user_tokens
            .insert("Shot".to_string(), "010".to_string());

        let text = format_user_tokens(&recording);
        assert_eq!(text, "Project=Demo,Shot=010");
        assert_eq!(parse_user_tokens(&text), recording.user_tokens);
    }
}
