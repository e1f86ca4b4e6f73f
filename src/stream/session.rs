//! Declarative session configuration
//!
//! Configurations compare by value, except that targets compare by identity:
//! two configs are equal when they name the same target objects with equal
//! encoder settings.

use std::sync::Arc;

use crate::config::ObsStreamData;
use crate::model::{AudioConfig, Resolution, StreamProtocol, VideoConfig};
use crate::stream::target::{AudioTarget, VideoTarget};

fn same_target<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Video stream: source target plus static encoder parameters
#[derive(Clone)]
pub struct VideoStreamConfig {
    pub target: Arc<dyn VideoTarget>,
    pub data: VideoConfig,
}

impl PartialEq for VideoStreamConfig {
    fn eq(&self, other: &Self) -> bool {
        same_target(&self.target, &other.target) && self.data == other.data
    }
}

impl Eq for VideoStreamConfig {}

impl std::fmt::Debug for VideoStreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStreamConfig")
            .field("target", &Arc::as_ptr(&self.target))
            .field("data", &self.data)
            .finish()
    }
}

/// Audio stream: source target plus encoder settings
#[derive(Clone)]
pub struct AudioStreamConfig {
    pub target: Arc<dyn AudioTarget>,
    pub data: AudioConfig,
}

impl PartialEq for AudioStreamConfig {
    fn eq(&self, other: &Self) -> bool {
        same_target(&self.target, &other.target) && self.data == other.data
    }
}

impl Eq for AudioStreamConfig {}

impl std::fmt::Debug for AudioStreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStreamConfig")
            .field("target", &Arc::as_ptr(&self.target))
            .field("data", &self.data)
            .finish()
    }
}

/// Everything needed to build one session runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub protocol: StreamProtocol,
    pub host: String,
    pub video: Option<VideoStreamConfig>,
    pub audio: Option<AudioStreamConfig>,
}

impl SessionConfig {
    /// Session for `data`; audio is included only when both a target and an
    /// audio config exist
    pub fn from_stream_data(
        data: &ObsStreamData,
        video: Arc<dyn VideoTarget>,
        audio: Option<Arc<dyn AudioTarget>>,
    ) -> Self {
        Self {
            protocol: data.protocol,
            host: data.host.clone(),
            video: Some(VideoStreamConfig {
                target: video,
                data: data.video,
            }),
            audio: audio.zip(data.audio).map(|(target, data)| AudioStreamConfig { target, data }),
        }
    }
}

/// Settings that can change while a session runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayConfig {
    pub resolution: Option<Resolution>,
    pub framerate: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::target::VideoTargetState;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Idle;

    #[async_trait]
    impl VideoTarget for Idle {
        async fn run(&self, _state: VideoTargetState, cancel: CancellationToken) {
            cancel.cancelled().await;
        }
    }

    fn data(host: &str) -> ObsStreamData {
        ObsStreamData::new(StreamProtocol::Mpegts, host)
    }

    #[test]
    fn equal_by_value_with_same_target() {
        let target: Arc<dyn VideoTarget> = Arc::new(Idle);
        let a = SessionConfig::from_stream_data(&data("udp://h:1"), target.clone(), None);
        let b = SessionConfig::from_stream_data(&data("udp://h:1"), target.clone(), None);
        assert_eq!(a, b);

        let c = SessionConfig::from_stream_data(&data("udp://h:2"), target, None);
        assert_ne!(a, c);
    }

    #[test]
    fn different_targets_differ() {
        let a = SessionConfig::from_stream_data(&data("udp://h:1"), Arc::new(Idle), None);
        let b = SessionConfig::from_stream_data(&data("udp://h:1"), Arc::new(Idle), None);
        assert_ne!(a, b);
    }
}
