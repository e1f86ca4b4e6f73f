//! Synthetic capture provider
//!
//! Devices are declared up front. While running, a generator thread pushes a
//! blank NV12 frame into every bound request at the configured rate.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::camera::device::{CaptureProvider, DeviceCharacteristics, DeviceInfo, DeviceSelector, LensFacing};
use crate::camera::request::{CaptureRequest, FramePlane, VideoFrame};
use crate::error::CaptureError;
use crate::model::{Framerate, PixFmt, Resolution};

const DEFAULT_FRAME_SIZE: Resolution = Resolution::new(640, 480);

/// One `bind` call as seen by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRecord {
    pub device_id: String,
    pub labels: Vec<&'static str>,
    pub request_ids: Vec<Uuid>,
}

struct Bound {
    request: Arc<CaptureRequest>,
    resolution: Resolution,
    luma: Bytes,
    chroma: Bytes,
}

impl Bound {
    fn new(request: Arc<CaptureRequest>) -> Self {
        let resolution = request.spec().resolution.unwrap_or(DEFAULT_FRAME_SIZE);
        let pixels = resolution.area() as usize;
        Self {
            request,
            resolution,
            luma: Bytes::from(vec![0x10; pixels]),
            chroma: Bytes::from(vec![0x80; pixels / 2]),
        }
    }

    fn frame(&self, timestamp_ns: u64) -> VideoFrame {
        let width = self.resolution.width as usize;
        VideoFrame {
            timestamp_ns,
            resolution: self.resolution,
            format: PixFmt::Nv12,
            planes: vec![
                FramePlane {
                    data: self.luma.clone(),
                    row_stride: width,
                    pixel_stride: 1,
                },
                FramePlane {
                    data: self.chroma.clone(),
                    row_stride: width,
                    pixel_stride: 2,
                },
            ],
        }
    }
}

#[derive(Default)]
struct ProviderState {
    bound: Vec<Bound>,
    bound_device: Option<String>,
    running: bool,
    binds: Vec<BindRecord>,
    fail_binds: usize,
    unavailable: bool,
}

struct Shared {
    devices: Vec<(DeviceInfo, DeviceCharacteristics)>,
    state: Mutex<ProviderState>,
    alive: AtomicBool,
}

/// In-process capture provider with scripted devices
pub struct SimProvider {
    shared: Arc<Shared>,
    generator: Option<JoinHandle<()>>,
}

impl SimProvider {
    pub fn new(devices: Vec<(DeviceInfo, DeviceCharacteristics)>, frame_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            devices,
            state: Mutex::new(ProviderState::default()),
            alive: AtomicBool::new(true),
        });

        let worker = shared.clone();
        let generator = thread::Builder::new()
            .name("sim-camera".into())
            .spawn(move || generate_frames(worker, frame_interval))
            .ok();

        Self { shared, generator }
    }

    /// Back and front phone cameras plus a device outside the standard pipeline
    pub fn phone() -> Self {
        let characteristics = DeviceCharacteristics {
            sizes: vec![
                Resolution::new(3840, 2160),
                Resolution::new(1920, 1080),
                Resolution::new(1280, 720),
                Resolution::new(640, 480),
            ],
            framerates: vec![Framerate::fixed(30), Framerate::fixed(60), Framerate::fixed(15)],
            max_record_size: Some(Resolution::new(1920, 1080)),
        };

        let device = |id: &str, facing, backward_compatible| DeviceInfo {
            id: id.to_string(),
            facing,
            backward_compatible,
        };

        Self::new(
            vec![
                (device("0", LensFacing::Back, true), characteristics.clone()),
                (device("1", LensFacing::Front, true), characteristics.clone()),
                (device("2", LensFacing::Back, false), characteristics),
            ],
            Duration::from_millis(33),
        )
    }

    /// Every bind seen so far, oldest first
    pub fn bind_history(&self) -> Vec<BindRecord> {
        self.shared.state.lock().binds.clone()
    }

    /// Labels of the currently bound requests
    pub fn bound_labels(&self) -> Vec<&'static str> {
        self.shared.state.lock().bound.iter().map(|b| b.request.label()).collect()
    }

    pub fn bound_device(&self) -> Option<String> {
        self.shared.state.lock().bound_device.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Fail the next `count` bind calls
    pub fn fail_next_binds(&self, count: usize) {
        self.shared.state.lock().fail_binds = count;
    }

    /// Report the provider as unavailable from now on
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl CaptureProvider for SimProvider {
    async fn ready(&self) -> Result<(), CaptureError> {
        if self.shared.state.lock().unavailable {
            return Err(CaptureError::ProviderUnavailable("simulated".into()));
        }
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.shared.devices.iter().map(|(info, _)| info.clone()).collect()
    }

    fn characteristics(&self, device_id: &str) -> Option<DeviceCharacteristics> {
        self.shared
            .devices
            .iter()
            .find(|(info, _)| info.id == device_id)
            .map(|(_, c)| c.clone())
    }

    async fn bind(&self, selector: &DeviceSelector, requests: &[Arc<CaptureRequest>]) -> Result<String, CaptureError> {
        let device_id = match selector.device_id() {
            Some(id) => self
                .shared
                .devices
                .iter()
                .find(|(info, _)| info.id == id)
                .map(|(info, _)| info.id.clone())
                .ok_or_else(|| CaptureError::DeviceNotFound(id.to_string()))?,
            None => self
                .shared
                .devices
                .first()
                .map(|(info, _)| info.id.clone())
                .ok_or(CaptureError::NoDevice)?,
        };

        let mut state = self.shared.state.lock();
        if state.fail_binds > 0 {
            state.fail_binds -= 1;
            return Err(CaptureError::BindFailed("simulated failure".into()));
        }

        state.binds.push(BindRecord {
            device_id: device_id.clone(),
            labels: requests.iter().map(|r| r.label()).collect(),
            request_ids: requests.iter().map(|r| r.id()).collect(),
        });
        state.bound = requests.iter().cloned().map(Bound::new).collect();
        state.bound_device = Some(device_id.clone());

        debug!(device_id = %device_id, requests = requests.len(), "Sim bind");
        Ok(device_id)
    }

    async fn unbind_all(&self) {
        let mut state = self.shared.state.lock();
        state.bound.clear();
        state.bound_device = None;
    }

    async fn set_running(&self, running: bool) {
        self.shared.state.lock().running = running;
        info!(running, "Sim camera");
    }
}

impl Drop for SimProvider {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }
    }
}

fn generate_frames(shared: Arc<Shared>, interval: Duration) {
    let start = Instant::now();

    while shared.alive.load(Ordering::Relaxed) {
        thread::sleep(interval);

        let state = shared.state.lock();
        if !state.running {
            continue;
        }

        let timestamp_ns = start.elapsed().as_nanos() as u64;
        for bound in &state.bound {
            bound.request.frames().push(bound.frame(timestamp_ns));
        }
    }
}
