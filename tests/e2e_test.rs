//! 端對端測試 - 從目錄與計畫檔案到錄製紀錄
//!
//! 使用暫存資料夾中的 JSON 檔案，以執行緒模式執行整批錄製

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::NaiveDate;
use sequence_batch_recorder::component::BatchRecorder;
use sequence_batch_recorder::component::execution_context::{
    PlaybackOutcome, read_manifest, run_execution_context,
};
use sequence_batch_recorder::component::progress_channel::{ProgressChannel, RunDescriptor};
use sequence_batch_recorder::component::schedule_builder::{
    ScheduleParams, TrackChannelFactory, WildcardContext, build_schedule,
};
use sequence_batch_recorder::config::types::{Config, HostMode, UserSettings};
use sequence_batch_recorder::tools::{RecordingPlan, SequenceCatalog, write_schedule_artifact};
use tempfile::tempdir;
use uuid::Uuid;

const CATALOG_JSON: &str = r#"{
    "sequences": [
        { "id": "intro", "name": "Intro", "duration": 1.5, "content": "intro.seq" },
        { "id": "empty", "name": "Empty", "duration": 3.0 },
        {
            "id": "chase",
            "name": "Chase",
            "duration": 8.0,
            "markers": [
                { "name": "RecordStart", "time": 2.0 },
                { "name": "RecordEnd", "time": 3.5 }
            ],
            "content": "chase.seq"
        }
    ]
}"#;

const PLAN_JSON: &str = r#"{
    "selected": ["intro", "empty", "chase", "missing"],
    "tasks": {
        "intro": [
            { "settings": { "kind": "movie", "container": "mp4", "include_audio": true }, "take": 3 }
        ],
        "chase": [
            { "settings": { "kind": "movie", "container": "mp4", "include_audio": true }, "take": 1 },
            {
                "target": "Hero",
                "settings": { "kind": "animation", "recursive": true },
                "naming_template": "<Project>_<Target>_<Take>",
                "path_policy": { "policy": "relative_to_global", "sub_path": "<Sequence>" }
            },
            { "settings": { "kind": "audio", "format": "wav" }, "enabled": false, "take": 7 }
        ]
    }
}"#;

fn write_inputs(root: &Path) {
    fs::write(root.join("catalog.json"), CATALOG_JSON).unwrap();
    fs::write(root.join("plan.json"), PLAN_JSON).unwrap();
}

fn config(root: &Path) -> Config {
    let mut settings = UserSettings::default();
    let recording = &mut settings.recording;
    recording.frame_rate = 20.0;
    recording.warmup_frames = 4;
    recording.margin_frames = 2;
    recording.host_mode = HostMode::Thread;
    recording.poll_interval_ms = 5;
    recording.output_dir = root.join("Recordings");
    recording.work_dir = root.join("work");
    recording
        .user_tokens
        .insert("Project".to_string(), "Demo".to_string());
    Config { settings }
}

/// 測試 1: 完整批次錄製並寫回 take 編號
#[test]
fn test_batch_record_from_files() {
    let root = tempdir().unwrap();
    write_inputs(root.path());

    let recorder = BatchRecorder::new(config(root.path()), Arc::new(AtomicBool::new(false)));
    let summary = recorder
        .record(&root.path().join("catalog.json"), &root.path().join("plan.json"))
        .unwrap();

    assert!(summary.is_completed(), "summary: {summary:?}");
    assert!(summary.error.is_none());
    assert_eq!(summary.segment_count, 2);
    assert_eq!(summary.clip_count, 3);
    assert_eq!(summary.missing_sequences, vec!["missing"]);
    assert!(summary.warnings.iter().any(|w| w.contains("Empty")));

    // 兩個片段各有 0.2s 預熱，中間 0.1s 間隔；Intro 沒有標記所以多一格
    let expected = 0.2 + 1.5 + 0.05 + 0.1 + 0.2 + 1.5;
    assert!((summary.total_duration - expected).abs() < 1e-9);

    let plan = RecordingPlan::load_from_file(&root.path().join("plan.json")).unwrap();
    assert!(summary.plan_updated);
    assert_eq!(plan.tasks["intro"][0].take, 4);
    assert_eq!(plan.tasks["chase"][0].take, 2);
    assert_eq!(plan.tasks["chase"][1].take, 2);
    // 停用的任務不遞增
    assert_eq!(plan.tasks["chase"][2].take, 7);

    let recordings = root.path().join("Recordings");
    let intro = read_manifest(&recordings.join("Intro_Movie_003.manifest.json")).unwrap();
    assert!(intro.complete);
    assert_eq!(intro.files, vec!["Intro_Movie_003.mp4"]);
    assert_eq!(intro.channel, "Movie Recorder Track");

    let hero = read_manifest(&recordings.join("Chase").join("Demo_Hero_001.manifest.json"))
        .unwrap();
    assert_eq!(hero.target.as_deref(), Some("Hero"));
    assert!((hero.start_local_time - 2.0).abs() < 1e-6);
    assert!(hero.end_local_time < 3.5);

    println!("✓ 批次錄製測試通過");
}

/// 測試 2: 沒有可錄製的項目時不更動計畫檔
#[test]
fn test_batch_record_nothing_enabled() {
    let root = tempdir().unwrap();
    fs::write(root.path().join("catalog.json"), CATALOG_JSON).unwrap();
    fs::write(
        root.path().join("plan.json"),
        r#"{ "selected": ["intro"], "tasks": {} }"#,
    )
    .unwrap();

    let recorder = BatchRecorder::new(config(root.path()), Arc::new(AtomicBool::new(false)));
    let summary = recorder
        .record(&root.path().join("catalog.json"), &root.path().join("plan.json"))
        .unwrap();

    assert!(summary.outcome.is_none());
    assert!(summary.error.is_some());
    assert!(!summary.plan_updated);
    assert!(!root.path().join("Recordings").exists());

    println!("✓ 無可錄製項目測試通過");
}

/// 測試 3: 執行環境收到中斷信號時保留已錄到的部分
#[test]
fn test_execution_context_interrupted_by_signal() {
    let root = tempdir().unwrap();
    write_inputs(root.path());

    let catalog = SequenceCatalog::load_from_file(&root.path().join("catalog.json")).unwrap();
    let plan = RecordingPlan::load_from_file(&root.path().join("plan.json")).unwrap();
    let (sequences, _) = plan.selected_sequences(&catalog);

    let params = ScheduleParams {
        frame_rate: 10.0,
        use_marker_ranges: true,
        global_output_dir: root.path().join("Recordings"),
        ..ScheduleParams::default()
    };
    let captured_at = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let wildcards = WildcardContext::new(captured_at, Default::default(), &BTreeMap::new());
    let schedule = build_schedule(
        &sequences,
        &plan.tasks,
        &params,
        &wildcards,
        &mut TrackChannelFactory,
    )
    .unwrap();

    let artifact = write_schedule_artifact(&schedule, &root.path().join("run")).unwrap();
    let channel = ProgressChannel::open(&root.path().join("channel")).unwrap();
    let run_id = Uuid::new_v4();
    channel
        .write_run_descriptor(&RunDescriptor {
            run_id,
            artifact_path: artifact.path.clone(),
            artifact_digest: artifact.digest.clone(),
            total_duration: schedule.total_duration,
            frame_rate: schedule.frame_rate,
            warmup_duration: schedule.warmup_duration,
            resolution: Default::default(),
            takes: Vec::new(),
            created_at: "2024-05-01T12:00:00".to_string(),
        })
        .unwrap();
    channel.set_alive().unwrap();

    let shutdown_signal = AtomicBool::new(true);
    let outcome = run_execution_context(channel.dir(), &shutdown_signal).unwrap();

    assert_eq!(outcome, PlaybackOutcome::Interrupted { frames: 0 });
    assert_eq!(channel.read_attached().unwrap().unwrap().run_id, run_id);
    let progress = channel.read_progress().unwrap().unwrap();
    assert!(progress.is_interrupted);
    assert!(!progress.is_complete);
    assert!(!channel.is_alive());

    println!("✓ 中斷信號測試通過");
}

/// 測試 4: 排程檔案被竄改時回報錯誤
#[test]
fn test_execution_context_rejects_tampered_artifact() {
    let root = tempdir().unwrap();
    write_inputs(root.path());

    let catalog = SequenceCatalog::load_from_file(&root.path().join("catalog.json")).unwrap();
    let plan = RecordingPlan::load_from_file(&root.path().join("plan.json")).unwrap();
    let (sequences, _) = plan.selected_sequences(&catalog);

    let captured_at = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let wildcards = WildcardContext::new(captured_at, Default::default(), &BTreeMap::new());
    let schedule = build_schedule(
        &sequences,
        &plan.tasks,
        &ScheduleParams::default(),
        &wildcards,
        &mut TrackChannelFactory,
    )
    .unwrap();

    let artifact = write_schedule_artifact(&schedule, &root.path().join("run")).unwrap();
    fs::write(&artifact.path, "{}").unwrap();

    let channel = ProgressChannel::open(&root.path().join("channel")).unwrap();
    channel
        .write_run_descriptor(&RunDescriptor {
            run_id: Uuid::new_v4(),
            artifact_path: artifact.path.clone(),
            artifact_digest: artifact.digest.clone(),
            total_duration: schedule.total_duration,
            frame_rate: schedule.frame_rate,
            warmup_duration: schedule.warmup_duration,
            resolution: Default::default(),
            takes: Vec::new(),
            created_at: "2024-05-01T12:00:00".to_string(),
        })
        .unwrap();
    channel.set_alive().unwrap();

    let shutdown_signal = AtomicBool::new(false);
    assert!(run_execution_context(channel.dir(), &shutdown_signal).is_err());
    assert!(channel.read_fault().unwrap().is_some());
    assert!(channel.read_attached().unwrap().is_none());
    assert!(!channel.is_alive());

    println!("✓ 排程檔案驗證測試通過");
}
