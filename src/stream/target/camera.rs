use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{VideoTarget, VideoTargetState};
use crate::camera::request::{CaptureRequest, VideoFrame};
use crate::camera::target::{CaptureTarget, RecordTarget};

/// Streams the Record slot into a video relay
pub struct CameraVideoTarget {
    record: Arc<RecordTarget>,
}

impl CameraVideoTarget {
    pub fn new(record: Arc<RecordTarget>) -> Self {
        Self { record }
    }

    pub fn record_target(&self) -> &Arc<RecordTarget> {
        &self.record
    }
}

async fn next_frame(request: Option<&Arc<CaptureRequest>>) -> VideoFrame {
    match request {
        Some(request) => request.frames().recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl VideoTarget for CameraVideoTarget {
    async fn run(&self, state: VideoTargetState, cancel: CancellationToken) {
        if state.framerate.is_some() {
            self.record.set_framerate(state.framerate);
        }

        let mut requests = self.record.request().subscribe();
        self.record.start();
        if let Err(e) = state.relay.start() {
            warn!(relay = %state.relay.id(), "Failed to start video relay: {}", e);
        }
        debug!(relay = %state.relay.id(), "Camera video target running");

        let mut current: Option<Arc<CaptureRequest>> = None;
        loop {
            let active = current.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(update) = requests.recv() => {
                    current = update.available().cloned();
                }
                frame = next_frame(active.as_ref()) => {
                    if let Err(e) = state.relay.send(&frame) {
                        trace!(relay = %state.relay.id(), "Frame rejected: {}", e);
                    }
                }
            }
        }

        self.record.stop();
        if let Err(e) = state.relay.stop() {
            debug!(relay = %state.relay.id(), "Failed to stop video relay: {}", e);
        }
        debug!(relay = %state.relay.id(), "Camera video target stopped");
    }
}
