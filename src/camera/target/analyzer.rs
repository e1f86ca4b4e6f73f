use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use super::{CaptureRequestState, CaptureTarget};
use crate::camera::arbiter::{CaptureArbiter, ConsumerSlot};
use crate::camera::request::{CaptureRequest, RequestSpec, VideoFrame};
use crate::state::StateCell;

/// Values decoded from one frame, e.g. QR payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub values: Vec<String>,
}

/// Frame analysis backend
pub trait FrameAnalyzer: Send + Sync + 'static {
    fn analyze(&self, frame: &VideoFrame) -> AnalysisResult;
}

/// Runs a [`FrameAnalyzer`] over frames from the Analyze slot
///
/// Results are published only while the slot is attached; a frame finishing
/// analysis after `stop` is discarded so the state stays `Stopped`.
pub struct AnalyzerTarget {
    arbiter: Arc<CaptureArbiter>,
    analyzer: Arc<dyn FrameAnalyzer>,
    request: StateCell<CaptureRequestState<AnalysisResult>>,
    pump: Mutex<Option<CancellationToken>>,
}

impl AnalyzerTarget {
    pub fn new(arbiter: Arc<CaptureArbiter>, analyzer: Arc<dyn FrameAnalyzer>) -> Self {
        Self {
            arbiter,
            analyzer,
            request: StateCell::new(CaptureRequestState::Stopped),
            pump: Mutex::new(None),
        }
    }
}

impl CaptureTarget for AnalyzerTarget {
    type Output = AnalysisResult;

    fn request(&self) -> &StateCell<CaptureRequestState<Self::Output>> {
        &self.request
    }

    /// Must be called from within a Tokio runtime
    fn start(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Unable to start analyzer outside a runtime: {}", e);
                return;
            }
        };

        let capture = Arc::new(CaptureRequest::new("analyzer", RequestSpec::default()));
        let token = CancellationToken::new();
        if let Some(previous) = self.pump.lock().replace(token.clone()) {
            previous.cancel();
        }

        let analyzer = self.analyzer.clone();
        let state = self.request.clone();
        let frames = capture.clone();
        runtime.spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => break,
                    frame = frames.frames().recv() => frame,
                };

                let result = analyzer.analyze(&frame);
                // `stop` cancels before publishing Stopped
                let published = state.update(|_| {
                    (!token.is_cancelled()).then(|| CaptureRequestState::Available(result))
                });
                if !published {
                    trace!("Discarding analysis finished after stop");
                }
            }
        });

        self.arbiter.attach(ConsumerSlot::Analyze, capture);
    }

    fn stop(&self) {
        if let Some(token) = self.pump.lock().take() {
            token.cancel();
        }
        self.arbiter.detach(ConsumerSlot::Analyze);
        self.request.set(CaptureRequestState::Stopped);
    }
}
