use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use super::{CaptureRequestState, CaptureTarget};
use crate::camera::arbiter::{CaptureArbiter, ConsumerSlot};
use crate::camera::query;
use crate::camera::request::{CaptureRequest, RequestSpec};
use crate::model::{Framerate, Resolution};
use crate::state::StateCell;

#[derive(Debug, Clone, Copy, Default)]
struct DevicePrefs {
    resolution: Option<Resolution>,
    framerate: Option<u32>,
}

/// Recording surface feeding the video stream
///
/// Resolution and framerate preferences are kept per device. Resolution
/// changes apply on the next start; framerate changes rebuild the request
/// immediately when attached.
pub struct RecordTarget {
    arbiter: Arc<CaptureArbiter>,
    prefs: Mutex<HashMap<String, DevicePrefs>>,
    request: StateCell<CaptureRequestState<Arc<CaptureRequest>>>,
}

impl RecordTarget {
    pub fn new(arbiter: Arc<CaptureArbiter>) -> Self {
        Self {
            arbiter,
            prefs: Mutex::new(HashMap::new()),
            request: StateCell::new(CaptureRequestState::Stopped),
        }
    }

    /// Preferred resolution for the current device, `None` for the default
    pub fn set_resolution(&self, resolution: Option<Resolution>) {
        let Some(id) = self.arbiter.current_device_id() else {
            error!("Unable to set resolution: unknown device id");
            return;
        };
        self.prefs.lock().entry(id).or_default().resolution = resolution;
    }

    /// Preferred framerate for the current device
    pub fn set_framerate(&self, fps: Option<u32>) {
        let Some(id) = self.arbiter.current_device_id() else {
            error!("Unable to set framerate: unknown device id");
            return;
        };

        let changed = {
            let mut prefs = self.prefs.lock();
            let entry = prefs.entry(id).or_default();
            let changed = entry.framerate != fps;
            entry.framerate = fps;
            changed
        };

        if changed && self.arbiter.is_attached(ConsumerSlot::Record) {
            debug!(fps = ?fps, "Rebuilding record request for new framerate");
            self.attach_new_request();
        }
    }

    /// Resolution the next start will request
    pub fn resolution(&self) -> Option<Resolution> {
        self.current_prefs().resolution
    }

    pub fn framerate(&self) -> Option<u32> {
        self.current_prefs().framerate
    }

    /// Sizes the current device supports, largest first
    pub fn supported_resolutions(&self) -> Vec<Resolution> {
        self.arbiter
            .characteristics()
            .map(|chars| query::supported_sizes(&chars))
            .unwrap_or_default()
    }

    fn current_prefs(&self) -> DevicePrefs {
        self.arbiter
            .current_device_id()
            .and_then(|id| self.prefs.lock().get(&id).copied())
            .unwrap_or_default()
    }

    fn build_request(&self) -> Arc<CaptureRequest> {
        let prefs = self.current_prefs();
        let chars = if prefs.resolution.is_none() || prefs.framerate.is_some() {
            self.arbiter.characteristics()
        } else {
            None
        };

        let resolution = prefs
            .resolution
            .or_else(|| chars.as_ref().and_then(query::default_record_size));
        let framerate: Option<Framerate> = prefs.framerate.map(|fps| {
            chars
                .as_ref()
                .and_then(|c| query::best_framerate(c, fps))
                .unwrap_or(Framerate::fixed(fps))
        });

        Arc::new(CaptureRequest::new("record", RequestSpec { resolution, framerate }))
    }

    fn attach_new_request(&self) {
        let request = self.build_request();
        self.arbiter.attach(ConsumerSlot::Record, request.clone());
        self.request.set(CaptureRequestState::Available(request));
    }
}

impl CaptureTarget for RecordTarget {
    type Output = Arc<CaptureRequest>;

    fn request(&self) -> &StateCell<CaptureRequestState<Self::Output>> {
        &self.request
    }

    fn start(&self) {
        self.attach_new_request();
    }

    fn stop(&self) {
        self.arbiter.detach(ConsumerSlot::Record);
        self.request.set(CaptureRequestState::Stopped);
    }
}
