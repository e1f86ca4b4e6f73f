//! Media sources a session pumps into its relays
//!
//! A stream task calls `run` with the stream's current state and a
//! cancellation token; `run` keeps the relay fed until the token fires, then
//! releases whatever it acquired before returning.

mod audio;
mod camera;

pub use audio::{AudioBlock, AudioCaptureTarget, AudioSource};
pub use camera::CameraVideoTarget;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::Resolution;
use crate::stream::relay::{AudioRelay, VideoRelay};

/// Live state of a video stream
#[derive(Debug, Clone)]
pub struct VideoTargetState {
    pub enabled: bool,
    pub relay: Arc<VideoRelay>,
    pub framerate: Option<u32>,
    pub resolution: Option<Resolution>,
}

/// Live state of an audio stream
#[derive(Debug, Clone)]
pub struct AudioTargetState {
    pub enabled: bool,
    pub relay: Arc<AudioRelay>,
}

/// Feeds frames to a video relay
#[async_trait]
pub trait VideoTarget: Send + Sync + 'static {
    async fn run(&self, state: VideoTargetState, cancel: CancellationToken);
}

/// Feeds samples to an audio relay
#[async_trait]
pub trait AudioTarget: Send + Sync + 'static {
    async fn run(&self, state: AudioTargetState, cancel: CancellationToken);
}
