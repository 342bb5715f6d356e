//! 執行階段：讀取錄製描述並逐格播放主排程
//!
//! 執行環境與建構階段沒有任何共享的物件，所有資訊都來自進度通道中的錄製描述，
//! 進度也只透過同一個通道回報。

use super::capture_manifest::{ClipCapture, build_manifest, manifest_path, write_manifest};
use crate::component::progress_channel::{AttachInfo, ProgressChannel, ProgressRecord, RunDescriptor};
use crate::component::schedule_builder::{MasterSchedule, TIME_EPSILON, WarmupMode};
use crate::tools::load_schedule_artifact;
use anyhow::{Result, anyhow, bail};
use log::{error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// 每隔幾格寫一次進度
const PROGRESS_INTERVAL_FRAMES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { frames: u64 },
    Interrupted { frames: u64 },
}

/// 主排程上某個時間點的播放位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Playhead {
    Warmup { segment_index: usize, local_time: f64 },
    Main { segment_index: usize, local_time: f64 },
    Margin,
}

/// 找出主排程時間對應的序列與序列內時間
#[must_use]
pub fn locate(schedule: &MasterSchedule, time: f64) -> Playhead {
    let Some((segment_index, segment)) = schedule.segment_at(time) else {
        return Playhead::Margin;
    };

    if time + TIME_EPSILON >= segment.main.start {
        return Playhead::Main {
            segment_index,
            local_time: segment.main.playback_offset + (time - segment.main.start),
        };
    }

    let local_time = match segment.warmup.map(|w| (w.start, w.mode)) {
        Some((start, WarmupMode::Seek { from })) => from + (time - start),
        _ => 0.0,
    };
    Playhead::Warmup {
        segment_index,
        local_time,
    }
}

#[derive(Debug, Default)]
struct ChannelCursor {
    next_clip: usize,
    active: Option<ClipCapture>,
}

/// 逐格推進主排程，並把每一格分派給當下有效的錄製片段
pub struct SchedulePlayer<'a> {
    schedule: &'a MasterSchedule,
    descriptor: &'a RunDescriptor,
    cursors: Vec<ChannelCursor>,
    manifests_written: usize,
}

impl<'a> SchedulePlayer<'a> {
    #[must_use]
    pub fn new(schedule: &'a MasterSchedule, descriptor: &'a RunDescriptor) -> Self {
        Self {
            schedule,
            descriptor,
            cursors: schedule
                .channels
                .iter()
                .map(|_| ChannelCursor::default())
                .collect(),
            manifests_written: 0,
        }
    }

    #[must_use]
    pub const fn manifests_written(&self) -> usize {
        self.manifests_written
    }

    pub fn capture_frame(&mut self, frame: u64, time: f64) -> Result<()> {
        let schedule = self.schedule;
        for (channel_index, channel) in schedule.channels.iter().enumerate() {
            let clips = &channel.clips;

            // 已結束的片段先寫出紀錄
            while let Some(clip) = clips.get(self.cursors[channel_index].next_clip) {
                if time < clip.end() - TIME_EPSILON {
                    break;
                }
                if let Some(capture) = self.cursors[channel_index].active.take() {
                    self.flush(channel_index, capture, true)?;
                }
                self.cursors[channel_index].next_clip += 1;
            }

            let cursor = &mut self.cursors[channel_index];
            let Some(clip) = clips.get(cursor.next_clip) else {
                continue;
            };
            if !clip.contains(time) {
                continue;
            }

            let clip_index = cursor.next_clip;
            let segment = &schedule.segments[clip.segment_index];
            let local_time = segment.main.playback_offset + (time - segment.main.start);
            cursor
                .active
                .get_or_insert_with(|| ClipCapture::new(clip_index, frame, local_time))
                .record(clip, local_time);
        }
        Ok(())
    }

    /// 寫出所有尚未結束的片段；`complete` 為 false 代表錄製被中斷
    pub fn finish(&mut self, complete: bool) -> Result<()> {
        for channel_index in 0..self.cursors.len() {
            if let Some(capture) = self.cursors[channel_index].active.take() {
                self.flush(channel_index, capture, complete)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, channel_index: usize, capture: ClipCapture, complete: bool) -> Result<()> {
        let schedule = self.schedule;
        let channel = &schedule.channels[channel_index];
        let clip = &channel.clips[capture.clip_index];
        let segment = &schedule.segments[clip.segment_index];
        let path = manifest_path(clip);

        let manifest = build_manifest(
            self.descriptor.run_id,
            channel,
            (&segment.sequence_id, &segment.sequence_name),
            capture,
            schedule.frame_rate,
            self.descriptor.resolution,
            complete,
        );
        write_manifest(&manifest, &path)?;
        self.manifests_written += 1;

        info!(
            "寫出錄製紀錄 {} ({} 格): {}",
            channel.key,
            manifest.frame_count,
            path.display()
        );
        Ok(())
    }

    fn status_text(&self, time: f64) -> String {
        match locate(self.schedule, time) {
            Playhead::Warmup { segment_index, .. } => {
                format!("預熱 {}", self.schedule.segments[segment_index].sequence_name)
            }
            Playhead::Main {
                segment_index,
                local_time,
            } => format!(
                "錄製 {} @ {local_time:.2}s",
                self.schedule.segments[segment_index].sequence_name
            ),
            Playhead::Margin => "片段間隔".to_string(),
        }
    }
}

/// 執行環境的進入點
///
/// 讀取錄製描述、驗證排程檔案、回報接手，然後逐格播放直到完成，
/// 或收到中止要求（通道中的 halt 或行程的中斷信號）。
pub fn run_execution_context(
    channel_dir: &Path,
    shutdown_signal: &AtomicBool,
) -> Result<PlaybackOutcome> {
    let channel = ProgressChannel::open(channel_dir)?;
    let descriptor = channel
        .read_run_descriptor()?
        .ok_or_else(|| anyhow!("進度通道中沒有錄製描述: {}", channel_dir.display()))?;

    let schedule = match load_schedule_artifact(
        &descriptor.artifact_path,
        &descriptor.artifact_digest,
    )
    .and_then(|schedule| verify_takes(&schedule, &descriptor).map(|()| schedule))
    {
        Ok(schedule) => schedule,
        Err(e) => {
            error!("無法載入排程檔案: {e:#}");
            channel.report_fault(&format!("{e:#}"))?;
            return Err(e);
        }
    };

    channel.mark_attached(&AttachInfo {
        pid: std::process::id(),
        run_id: descriptor.run_id,
    })?;
    info!(
        "執行環境已接手錄製 {}，共 {} 格",
        descriptor.run_id,
        schedule.frame_count()
    );

    match play(&channel, &schedule, &descriptor, shutdown_signal) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            error!("播放失敗: {e:#}");
            if let Err(report_error) = channel.report_fault(&format!("{e:#}")) {
                warn!("無法回報錯誤: {report_error:#}");
            }
            Err(e)
        }
    }
}

/// 錄製描述中列出的 take 編號必須與排程檔案中的片段一致
fn verify_takes(schedule: &MasterSchedule, descriptor: &RunDescriptor) -> Result<()> {
    for channel in &schedule.channels {
        for clip in &channel.clips {
            let segment = schedule
                .segments
                .get(clip.segment_index)
                .ok_or_else(|| anyhow!("片段指向不存在的序列: {}", clip.segment_index))?;

            let listed = descriptor
                .takes
                .iter()
                .filter(|m| m.sequence_id == segment.sequence_id)
                .flat_map(|m| &m.takes)
                .find(|t| t.kind == channel.key.kind && t.target == channel.key.target);

            if let Some(listed) = listed {
                if listed.take != clip.take {
                    bail!(
                        "{} 的 {} take 編號不一致：錄製描述為 {}，排程為 {}",
                        segment.sequence_name,
                        channel.key,
                        listed.take,
                        clip.take
                    );
                }
            }
        }
    }
    Ok(())
}

fn play(
    channel: &ProgressChannel,
    schedule: &MasterSchedule,
    descriptor: &RunDescriptor,
    shutdown_signal: &AtomicBool,
) -> Result<PlaybackOutcome> {
    let started = Instant::now();
    let frame_count = schedule.frame_count();
    let frame_duration = schedule.frame_duration();
    let mut player = SchedulePlayer::new(schedule, descriptor);

    for frame in 0..frame_count {
        if shutdown_signal.load(Ordering::SeqCst) || channel.halt_requested() {
            warn!("收到中止要求，停止於第 {frame} 格");
            player.finish(false)?;
            channel.mark_interrupted("錄製已中斷", started.elapsed().as_secs_f64())?;
            return Ok(PlaybackOutcome::Interrupted { frames: frame });
        }

        let time = frame as f64 * frame_duration;
        player.capture_frame(frame, time)?;

        if frame % PROGRESS_INTERVAL_FRAMES == 0 {
            channel.write_progress(&ProgressRecord {
                fraction: (frame + 1) as f64 / frame_count as f64,
                status_text: player.status_text(time),
                elapsed_secs: started.elapsed().as_secs_f64(),
                is_complete: false,
                is_interrupted: false,
            })?;
        }
    }

    player.finish(true)?;
    channel.mark_complete("錄製完成", started.elapsed().as_secs_f64())?;
    info!(
        "錄製完成：{frame_count} 格，{} 份錄製紀錄",
        player.manifests_written()
    );

    Ok(PlaybackOutcome::Completed {
        frames: frame_count,
    })
}
