use super::channel_registry::{ChannelFactory, ChannelRegistry};
use super::range_resolver::resolve_range;
use super::types::{
    CaptureTaskDescriptor, MainSpan, MarkerNames, MasterSchedule, PathPolicy, PlacedClip,
    PlacedSegment, RecordingRange, Sequence, TaskTable, WarmupMode, WarmupSpan,
};
use super::wildcard::WildcardContext;
use crate::error::{RecorderError, RecorderResult};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// 建立主排程所需的全域參數（時間單位皆為秒）
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleParams {
    pub warmup_duration: f64,
    pub margin_duration: f64,
    pub frame_rate: f64,
    pub markers: MarkerNames,
    pub use_marker_ranges: bool,
    /// 找不到標記時是否退回整段長度
    pub allow_range_fallback: bool,
    pub global_output_dir: PathBuf,
    pub default_naming_template: String,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            warmup_duration: 0.0,
            margin_duration: 0.0,
            frame_rate: 30.0,
            markers: MarkerNames::default(),
            use_marker_ranges: false,
            allow_range_fallback: true,
            global_output_dir: PathBuf::from("Recordings"),
            default_naming_template: "<Sequence>_<Kind>_<Take>".to_string(),
        }
    }
}

impl ScheduleParams {
    fn validate(&self) -> RecorderResult<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(RecorderError::Construction(format!(
                "影格率必須大於 0: {}",
                self.frame_rate
            )));
        }
        if !self.warmup_duration.is_finite() || self.warmup_duration < 0.0 {
            return Err(RecorderError::Construction(format!(
                "預熱長度不可為負: {}",
                self.warmup_duration
            )));
        }
        if !self.margin_duration.is_finite() || self.margin_duration < 0.0 {
            return Err(RecorderError::Construction(format!(
                "片段間隔不可為負: {}",
                self.margin_duration
            )));
        }
        Ok(())
    }
}

/// 將選取的序列依序排入主排程
///
/// 以游標從 0 開始單次由左至右配置：
/// 1. 沒有內容的序列略過並記錄警告
/// 2. 每個序列只解析一次錄製範圍
/// 3. 第二個片段起，先加上片段間隔
/// 4. 有預熱時先放預熱區段，範圍有效則從 `範圍起點 - 預熱` 開始播放，否則停在 0
/// 5. 主區段長度為有效範圍的長度，或整段長度加一格（確保最後一格被錄到）
/// 6. 每個啟用的任務在對應通道上放一個與主區段等長的片段
///
/// 沒有啟用任務的序列仍會佔用時間軸，只是不產生片段。
pub fn build_schedule(
    sequences: &[Sequence],
    tasks: &TaskTable,
    params: &ScheduleParams,
    wildcards: &WildcardContext,
    factory: &mut dyn ChannelFactory,
) -> RecorderResult<MasterSchedule> {
    params.validate()?;

    let one_frame = 1.0 / params.frame_rate;
    let mut registry = ChannelRegistry::new();
    let mut segments: Vec<PlacedSegment> = Vec::with_capacity(sequences.len());
    let mut warnings = Vec::new();
    let mut cursor = 0.0;

    for sequence in sequences {
        if !sequence.has_content() {
            let message = format!("序列 `{}` 沒有可播放的內容，已略過", sequence.name);
            warn!("{message}");
            warnings.push(message);
            continue;
        }

        let range = resolve_sequence_range(sequence, params, &mut warnings)?;

        if !segments.is_empty() && params.margin_duration > 0.0 {
            cursor += params.margin_duration;
        }

        let warmup = if params.warmup_duration > 0.0 {
            let mode = if range.is_valid {
                WarmupMode::Seek {
                    from: (range.start - params.warmup_duration).max(0.0),
                }
            } else {
                WarmupMode::Freeze
            };
            let span = WarmupSpan {
                start: cursor,
                duration: params.warmup_duration,
                mode,
            };
            cursor += params.warmup_duration;
            Some(span)
        } else {
            None
        };

        let main = if range.is_valid {
            MainSpan {
                start: cursor,
                duration: range.duration,
                playback_offset: range.start,
            }
        } else {
            MainSpan {
                start: cursor,
                duration: sequence.duration + one_frame,
                playback_offset: 0.0,
            }
        };

        let segment_index = segments.len();
        let enabled: Vec<&CaptureTaskDescriptor> = tasks
            .get(&sequence.id)
            .map(|list| list.iter().filter(|t| t.enabled).collect())
            .unwrap_or_default();

        if enabled.is_empty() {
            debug!("序列 `{}` 沒有啟用的錄製任務，只保留時間軸位置", sequence.name);
        }

        for task in enabled {
            let key = task.channel_key();
            let channel_ref = registry.channel_for(&key, factory)?;
            let context =
                wildcards.for_task(&sequence.name, task.kind(), task.take, task.target.as_deref());
            let template = task
                .naming_template
                .as_deref()
                .unwrap_or(&params.default_naming_template);

            registry.place(
                channel_ref,
                PlacedClip {
                    segment_index,
                    start: main.start,
                    duration: main.duration,
                    channel_ref,
                    take: task.take,
                    output_name: context.resolve(template),
                    output_path: resolve_output_path(
                        &task.path_policy,
                        &params.global_output_dir,
                        &context,
                    ),
                    settings: task.settings.clone(),
                },
            )?;
        }

        cursor = main.end();
        segments.push(PlacedSegment {
            sequence_id: sequence.id.clone(),
            sequence_name: sequence.name.clone(),
            warmup,
            main,
        });
    }

    if segments.is_empty() {
        return Err(RecorderError::Construction("沒有可錄製的序列".to_string()));
    }
    if registry.is_empty() {
        return Err(RecorderError::Construction(
            "選取的序列中沒有啟用的錄製任務".to_string(),
        ));
    }

    let schedule = MasterSchedule {
        segments,
        channels: registry.into_channels(),
        total_duration: cursor,
        frame_rate: params.frame_rate,
        warmup_duration: params.warmup_duration,
        margin_duration: params.margin_duration,
        warnings,
    };

    info!(
        "排程完成：{} 個片段、{} 個通道、{} 個錄製片段，總長 {:.3}s",
        schedule.segments.len(),
        schedule.channels.len(),
        schedule.clip_count(),
        schedule.total_duration
    );

    Ok(schedule)
}

fn resolve_sequence_range(
    sequence: &Sequence,
    params: &ScheduleParams,
    warnings: &mut Vec<String>,
) -> RecorderResult<RecordingRange> {
    if !params.use_marker_ranges {
        return Ok(RecordingRange::full(sequence));
    }

    let range = resolve_range(
        sequence,
        &params.markers.start,
        &params.markers.end,
        params.allow_range_fallback,
    )?;

    if !range.is_valid {
        let message = format!(
            "序列 `{}` 找不到有效的標記範圍 `{}` → `{}`，改為錄製完整長度",
            sequence.name, params.markers.start, params.markers.end
        );
        warn!("{message}");
        warnings.push(message);
    }

    Ok(range)
}

fn resolve_output_path(policy: &PathPolicy, global: &Path, context: &WildcardContext) -> PathBuf {
    match policy {
        PathPolicy::Global => global.to_path_buf(),
        PathPolicy::RelativeToGlobal { sub_path } => global.join(context.resolve(sub_path)),
        PathPolicy::Custom { path } => PathBuf::from(context.resolve(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::schedule_builder::channel_registry::TrackChannelFactory;
    use crate::component::schedule_builder::types::{
        CaptureSettings, ChannelKey, Marker, Resolution, TaskKind,
    };
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    const FPS: f64 = 30.0;

    fn wildcards() -> WildcardContext {
        let captured_at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        WildcardContext::new(captured_at, Resolution::default(), &BTreeMap::new())
    }

    fn sequence(id: &str, duration: f64, markers: &[(&str, f64)]) -> Sequence {
        Sequence {
            id: id.to_string(),
            name: id.to_uppercase(),
            duration,
            markers: markers
                .iter()
                .map(|(name, time)| Marker {
                    name: (*name).to_string(),
                    time: *time,
                })
                .collect(),
            content: Some(format!("{id}.timeline")),
        }
    }

    fn movie() -> CaptureTaskDescriptor {
        CaptureTaskDescriptor::new(CaptureSettings::Movie {
            container: "mp4".to_string(),
            include_audio: false,
        })
    }

    fn animation(target: &str) -> CaptureTaskDescriptor {
        CaptureTaskDescriptor::new(CaptureSettings::Animation { recursive: true }).with_target(target)
    }

    fn params(warmup: f64, margin: f64, use_markers: bool) -> ScheduleParams {
        ScheduleParams {
            warmup_duration: warmup,
            margin_duration: margin,
            frame_rate: FPS,
            markers: MarkerNames {
                start: "start".to_string(),
                end: "end".to_string(),
            },
            use_marker_ranges: use_markers,
            ..ScheduleParams::default()
        }
    }

    fn build(
        sequences: &[Sequence],
        tasks: &TaskTable,
        params: &ScheduleParams,
    ) -> RecorderResult<MasterSchedule> {
        build_schedule(sequences, tasks, params, &wildcards(), &mut TrackChannelFactory)
    }

    #[test]
    fn test_marker_range_and_margin_layout() {
        let sequences = vec![
            sequence("a", 2.0, &[]),
            sequence("b", 3.0, &[("start", 1.0), ("end", 2.0)]),
        ];
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie()]);
        tasks.insert("b".to_string(), vec![movie()]);

        let schedule = build(&sequences, &tasks, &params(0.0, 0.5, true)).unwrap();

        // A 沒有標記，錄完整長度並多錄一格
        let expected = 2.0 + 1.0 / FPS + 0.5 + 1.0;
        assert!((schedule.total_duration - expected).abs() < 1e-9);

        let b = &schedule.segments[1];
        assert!((b.main.duration - 1.0).abs() < 1e-9);
        assert!((b.main.playback_offset - 1.0).abs() < 1e-9);
        assert!((b.main.start - (2.0 + 1.0 / FPS + 0.5)).abs() < 1e-9);
        assert_eq!(schedule.warnings.len(), 1);
    }

    #[test]
    fn test_total_duration_matches_sum_of_parts() {
        let sequences = vec![
            sequence("a", 4.0, &[("start", 1.0), ("end", 3.0)]),
            sequence("b", 2.5, &[]),
            sequence("c", 1.25, &[("start", 0.25), ("end", 1.0)]),
        ];
        let mut tasks = TaskTable::new();
        for id in ["a", "b", "c"] {
            tasks.insert(id.to_string(), vec![movie()]);
        }

        for (warmup, margin) in [(0.0, 0.0), (0.5, 0.0), (0.0, 0.75), (1.0, 0.2)] {
            let schedule = build(&sequences, &tasks, &params(warmup, margin, true)).unwrap();
            let mains: f64 = schedule.segments.iter().map(|s| s.main.duration).sum();
            let warmups: f64 = schedule
                .segments
                .iter()
                .filter_map(|s| s.warmup.map(|w| w.duration))
                .sum();
            let expected = mains + warmups + margin * (schedule.segments.len() - 1) as f64;
            assert!((schedule.total_duration - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_warmup_seeks_before_valid_range() {
        let sequences = vec![
            sequence("a", 5.0, &[("start", 2.0), ("end", 4.0)]),
            sequence("b", 5.0, &[("start", 0.5), ("end", 4.0)]),
            sequence("c", 5.0, &[]),
        ];
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie()]);

        let schedule = build(&sequences, &tasks, &params(1.0, 0.0, true)).unwrap();

        let a = schedule.segments[0].warmup.unwrap();
        assert!((a.start).abs() < 1e-9);
        assert_eq!(a.mode, WarmupMode::Seek { from: 1.0 });
        assert!((schedule.segments[0].main.start - 1.0).abs() < 1e-9);

        let b = schedule.segments[1].warmup.unwrap();
        assert_eq!(b.mode, WarmupMode::Seek { from: 0.0 });

        let c = schedule.segments[2].warmup.unwrap();
        assert_eq!(c.mode, WarmupMode::Freeze);
    }

    #[test]
    fn test_same_channel_key_is_multiplexed() {
        let sequences = vec![sequence("a", 2.0, &[]), sequence("b", 3.0, &[])];
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie(), animation("Hero")]);
        tasks.insert("b".to_string(), vec![movie(), animation("Villain")]);

        let schedule = build(&sequences, &tasks, &params(0.0, 0.0, false)).unwrap();

        assert_eq!(schedule.channels.len(), 3);
        let movie_channel = schedule
            .channel(&ChannelKey {
                kind: TaskKind::Movie,
                target: None,
            })
            .unwrap();
        assert_eq!(movie_channel.clips.len(), 2);
        let first = &movie_channel.clips[0];
        let second = &movie_channel.clips[1];
        assert!(first.end() <= second.start + 1e-9);
        assert_eq!(first.channel_ref, second.channel_ref);
    }

    #[test]
    fn test_sequence_without_enabled_tasks_reserves_time() {
        let sequences = vec![
            sequence("a", 2.0, &[]),
            sequence("b", 3.0, &[]),
            sequence("c", 1.0, &[]),
        ];
        let mut disabled = movie();
        disabled.enabled = false;
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie()]);
        tasks.insert("b".to_string(), vec![disabled]);
        tasks.insert("c".to_string(), vec![movie()]);

        let schedule = build(&sequences, &tasks, &params(0.0, 0.0, false)).unwrap();

        assert_eq!(schedule.segments.len(), 3);
        assert_eq!(schedule.clip_count(), 2);
        let clips = &schedule.channels[0].clips;
        assert_eq!(clips[1].segment_index, 2);
        let frame = 1.0 / FPS;
        assert!((clips[1].start - (2.0 + frame + 3.0 + frame)).abs() < 1e-9);
    }

    #[test]
    fn test_sequence_without_content_is_skipped() {
        let mut empty = sequence("b", 3.0, &[]);
        empty.content = None;
        let sequences = vec![sequence("a", 2.0, &[]), empty, sequence("c", 1.0, &[])];
        let mut tasks = TaskTable::new();
        for id in ["a", "b", "c"] {
            tasks.insert(id.to_string(), vec![movie()]);
        }

        let schedule = build(&sequences, &tasks, &params(0.0, 0.5, false)).unwrap();

        assert_eq!(schedule.segments.len(), 2);
        assert_eq!(schedule.segments[1].sequence_id, "c");
        assert_eq!(schedule.warnings.len(), 1);
        let frame = 1.0 / FPS;
        assert!((schedule.total_duration - (2.0 + frame + 0.5 + 1.0 + frame)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_markers_without_fallback_fails() {
        let sequences = vec![sequence("a", 2.0, &[])];
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie()]);
        let mut strict = params(0.0, 0.0, true);
        strict.allow_range_fallback = false;

        let error = build(&sequences, &tasks, &strict).unwrap_err();
        assert!(matches!(error, RecorderError::RangeNotFound { .. }));
    }

    #[test]
    fn test_output_naming_and_path_policy() {
        let sequences = vec![sequence("intro", 1.0, &[])];
        let mut relative = movie();
        relative.take = 7;
        relative.path_policy = PathPolicy::RelativeToGlobal {
            sub_path: "<Sequence>/<Date>".to_string(),
        };
        let mut custom = animation("Hero");
        custom.naming_template = Some("<Target>_<Custom>".to_string());
        custom.path_policy = PathPolicy::Custom {
            path: "/captures/<Kind>".to_string(),
        };
        let mut tasks = TaskTable::new();
        tasks.insert("intro".to_string(), vec![relative, custom]);

        let schedule = build(&sequences, &tasks, &params(0.0, 0.0, false)).unwrap();

        let movie_clip = &schedule.channels[0].clips[0];
        assert_eq!(movie_clip.output_name, "INTRO_Movie_007");
        assert_eq!(
            movie_clip.output_path,
            PathBuf::from("Recordings").join("INTRO/2024-01-02")
        );

        let anim_clip = &schedule.channels[1].clips[0];
        assert_eq!(anim_clip.output_name, "Hero_<Custom>");
        assert_eq!(anim_clip.output_path, PathBuf::from("/captures/Animation"));
    }

    #[test]
    fn test_nothing_to_record_is_construction_error() {
        let sequences = vec![sequence("a", 2.0, &[])];
        let error = build(&sequences, &TaskTable::new(), &params(0.0, 0.0, false)).unwrap_err();
        assert!(matches!(error, RecorderError::Construction(_)));

        let error = build(&[], &TaskTable::new(), &params(0.0, 0.0, false)).unwrap_err();
        assert!(matches!(error, RecorderError::Construction(_)));
    }

    #[test]
    fn test_invalid_frame_rate_is_rejected() {
        let sequences = vec![sequence("a", 2.0, &[])];
        let mut tasks = TaskTable::new();
        tasks.insert("a".to_string(), vec![movie()]);
        let mut bad = params(0.0, 0.0, false);
        bad.frame_rate = 0.0;

        assert!(build(&sequences, &tasks, &bad).is_err());
    }
}
