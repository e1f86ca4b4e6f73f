use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::{AudioTarget, AudioTargetState};
use crate::error::CaptureError;

/// One block of interleaved PCM
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub timestamp_ns: u64,
    pub data: Bytes,
}

/// Microphone-like PCM source
pub trait AudioSource: Send + Sync + 'static {
    fn start(&self) -> Result<(), CaptureError>;

    fn stop(&self);

    /// Blocking read of the next block; returns within roughly one block
    /// duration, `None` once the source has stopped
    fn read(&self) -> Option<AudioBlock>;
}

/// Pumps an [`AudioSource`] into an audio relay on a blocking thread
pub struct AudioCaptureTarget {
    source: Arc<dyn AudioSource>,
}

impl AudioCaptureTarget {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AudioTarget for AudioCaptureTarget {
    async fn run(&self, state: AudioTargetState, cancel: CancellationToken) {
        if let Err(e) = self.source.start() {
            error!("Failed to start audio source: {}", e);
            cancel.cancelled().await;
            return;
        }
        if let Err(e) = state.relay.start() {
            warn!(relay = %state.relay.id(), "Failed to start audio relay: {}", e);
        }

        let source = self.source.clone();
        let relay = state.relay.clone();
        let token = cancel.clone();
        let pump = tokio::task::spawn_blocking(move || {
            while !token.is_cancelled() {
                let Some(block) = source.read() else {
                    break;
                };
                if let Err(e) = relay.send(block.timestamp_ns, &block.data) {
                    trace!(relay = %relay.id(), "Audio block rejected: {}", e);
                }
            }
        });

        cancel.cancelled().await;
        self.source.stop();
        if let Err(e) = pump.await {
            error!("Audio pump panicked: {}", e);
        }
        if let Err(e) = state.relay.stop() {
            debug!(relay = %state.relay.id(), "Failed to stop audio relay: {}", e);
        }
    }
}
