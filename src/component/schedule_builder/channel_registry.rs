use super::types::{Channel, ChannelHandle, ChannelKey, PlacedClip, TIME_EPSILON};
use crate::error::{RecorderError, RecorderResult};
use log::debug;
use std::collections::HashMap;

/// 依錄製類型建立輸出通道的外部協作者
pub trait ChannelFactory {
    fn create_channel(&mut self, key: &ChannelKey, index: usize) -> RecorderResult<ChannelHandle>;
}

/// 預設實作：只為通道命名，不做任何 I/O
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackChannelFactory;

impl ChannelFactory for TrackChannelFactory {
    fn create_channel(&mut self, key: &ChannelKey, index: usize) -> RecorderResult<ChannelHandle> {
        let label = match &key.target {
            Some(target) => format!("{} Recorder Track ({target})", key.kind),
            None => format!("{} Recorder Track", key.kind),
        };
        Ok(ChannelHandle { index, label })
    }
}

/// 以 `ChannelKey` 為鍵的通道表，第一次引用時才建立通道
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    index: HashMap<ChannelKey, usize>,
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得鍵對應的通道，不存在時透過 factory 建立
    pub fn channel_for(
        &mut self,
        key: &ChannelKey,
        factory: &mut dyn ChannelFactory,
    ) -> RecorderResult<usize> {
        if let Some(&index) = self.index.get(key) {
            return Ok(index);
        }

        let index = self.channels.len();
        let handle = factory.create_channel(key, index)?;
        debug!("建立通道 [{index}] {key}: {}", handle.label);

        self.channels.push(Channel {
            key: key.clone(),
            handle,
            clips: Vec::new(),
        });
        self.index.insert(key.clone(), index);
        Ok(index)
    }

    /// 在通道尾端放入片段；起點必須遞增且不可與前一個片段重疊
    pub fn place(&mut self, index: usize, clip: PlacedClip) -> RecorderResult<()> {
        let channel = self.channels.get_mut(index).ok_or_else(|| {
            RecorderError::Construction(format!("通道 [{index}] 不存在"))
        })?;

        if let Some(last) = channel.clips.last() {
            if clip.start <= last.start || clip.start < last.end() - TIME_EPSILON {
                return Err(RecorderError::Construction(format!(
                    "通道 {} 的片段重疊: {:.3}s 早於 {:.3}s",
                    channel.key,
                    clip.start,
                    last.end()
                )));
            }
        }

        channel.clips.push(clip);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn into_channels(self) -> Vec<Channel> {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::schedule_builder::types::{CaptureSettings, TaskKind};
    use std::path::PathBuf;

    fn clip(start: f64, duration: f64) -> PlacedClip {
        PlacedClip {
            segment_index: 0,
            start,
            duration,
            channel_ref: 0,
            take: 1,
            output_name: "out".to_string(),
            output_path: PathBuf::from("/tmp"),
            settings: CaptureSettings::Audio {
                format: "wav".to_string(),
            },
        }
    }

    #[test]
    fn test_same_key_reuses_channel() {
        let mut registry = ChannelRegistry::new();
        let mut factory = TrackChannelFactory;
        let key = ChannelKey {
            kind: TaskKind::Movie,
            target: None,
        };

        let first = registry.channel_for(&key, &mut factory).unwrap();
        let second = registry.channel_for(&key, &mut factory).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_targets_get_distinct_channels() {
        let mut registry = ChannelRegistry::new();
        let mut factory = TrackChannelFactory;
        let a = ChannelKey {
            kind: TaskKind::Animation,
            target: Some("Hero".to_string()),
        };
        let b = ChannelKey {
            kind: TaskKind::Animation,
            target: Some("Villain".to_string()),
        };

        let first = registry.channel_for(&a, &mut factory).unwrap();
        let second = registry.channel_for(&b, &mut factory).unwrap();

        assert_ne!(first, second);
        let channels = registry.into_channels();
        assert_eq!(channels[1].handle.label, "Animation Recorder Track (Villain)");
    }

    #[test]
    fn test_overlapping_clip_is_rejected() {
        let mut registry = ChannelRegistry::new();
        let mut factory = TrackChannelFactory;
        let key = ChannelKey {
            kind: TaskKind::Audio,
            target: None,
        };
        let index = registry.channel_for(&key, &mut factory).unwrap();

        registry.place(index, clip(0.0, 2.0)).unwrap();
        registry.place(index, clip(2.0, 1.0)).unwrap();
        assert!(registry.place(index, clip(2.5, 1.0)).is_err());
    }
}
