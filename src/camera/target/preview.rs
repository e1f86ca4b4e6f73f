use std::sync::Arc;

use super::{CaptureRequestState, CaptureTarget};
use crate::camera::arbiter::{CaptureArbiter, ConsumerSlot};
use crate::camera::query;
use crate::camera::request::{CaptureRequest, RequestSpec};
use crate::model::Resolution;
use crate::state::StateCell;

/// Live preview surface
pub struct PreviewTarget {
    arbiter: Arc<CaptureArbiter>,
    window: parking_lot::Mutex<Option<Resolution>>,
    request: StateCell<CaptureRequestState<Arc<CaptureRequest>>>,
}

impl PreviewTarget {
    pub fn new(arbiter: Arc<CaptureArbiter>) -> Self {
        Self {
            arbiter,
            window: parking_lot::Mutex::new(None),
            request: StateCell::new(CaptureRequestState::Stopped),
        }
    }

    /// Size of the surface showing the preview; applied on next start
    pub fn set_window_size(&self, window: Option<Resolution>) {
        *self.window.lock() = window;
    }
}

impl CaptureTarget for PreviewTarget {
    type Output = Arc<CaptureRequest>;

    fn request(&self) -> &StateCell<CaptureRequestState<Self::Output>> {
        &self.request
    }

    fn start(&self) {
        let window = *self.window.lock();
        let resolution = self
            .arbiter
            .characteristics()
            .and_then(|chars| query::max_preview_size(&chars, window));

        let request = Arc::new(CaptureRequest::new(
            "preview",
            RequestSpec {
                resolution,
                framerate: None,
            },
        ));
        self.arbiter.attach(ConsumerSlot::Preview, request.clone());
        self.request.set(CaptureRequestState::Available(request));
    }

    fn stop(&self) {
        self.arbiter.detach(ConsumerSlot::Preview);
        self.request.set(CaptureRequestState::Stopped);
    }
}
