//! Capture Device Handle
//!
//! Wraps the capture provider's lifecycle (idle / started) and the set of
//! requests bound to it. Every provider call is marshaled onto one dedicated
//! worker thread so operations against the pipeline are strictly serialized;
//! callers enqueue commands and return immediately.

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::camera::request::CaptureRequest;
use crate::error::CaptureError;
use crate::model::{Framerate, Resolution};

/// Direction a capture device faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensFacing {
    Back,
    Front,
    External,
}

/// Enumerated capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub facing: LensFacing,
    /// Device supports the standard capture pipeline
    pub backward_compatible: bool,
}

/// Hardware capabilities of a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCharacteristics {
    /// Supported output sizes, any order
    pub sizes: Vec<Resolution>,
    pub framerates: Vec<Framerate>,
    /// Largest size usable for recording alongside a preview
    pub max_record_size: Option<Resolution>,
}

/// Filter choosing which device a bind targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    device_id: Option<String>,
}

impl DeviceSelector {
    /// Any device, provider's choice
    pub fn any() -> Self {
        Self { device_id: None }
    }

    pub fn require_id(id: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

/// Platform capture pipeline
///
/// `bind` replaces the whole bound set; rebinding with an unchanged selector
/// and request set must be harmless.
#[async_trait]
pub trait CaptureProvider: Send + Sync + 'static {
    /// Resolves once the provider instance is usable
    async fn ready(&self) -> Result<(), CaptureError>;

    fn devices(&self) -> Vec<DeviceInfo>;

    fn characteristics(&self, device_id: &str) -> Option<DeviceCharacteristics>;

    /// Bind `requests` to the device matched by `selector`; returns its id
    async fn bind(
        &self,
        selector: &DeviceSelector,
        requests: &[Arc<CaptureRequest>],
    ) -> Result<String, CaptureError>;

    async fn unbind_all(&self);

    /// Start or stop producing frames for bound requests
    async fn set_running(&self, running: bool);
}

enum Command {
    Start,
    Stop,
    Bind {
        selector: DeviceSelector,
        requests: Vec<Arc<CaptureRequest>>,
    },
    UnbindAll,
    Sync(oneshot::Sender<()>),
    Shutdown,
}

/// Blocks sync callers until the provider's first readiness outcome
struct ReadyGate {
    outcome: Mutex<Option<bool>>,
    cond: Condvar,
}

impl ReadyGate {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn resolve(&self, ready: bool) {
        *self.outcome.lock() = Some(ready);
        self.cond.notify_all();
    }

    fn wait(&self) -> bool {
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            self.cond.wait(&mut outcome);
        }
        (*outcome).unwrap_or(false)
    }
}

struct Shared {
    provider: Arc<dyn CaptureProvider>,
    started: AtomicBool,
    /// Last issued start/stop; the worker runs them in order, so this is
    /// where the pipeline ends up once the queue drains
    wanted: AtomicBool,
    bound_device: Mutex<Option<String>>,
    bound_requests: Mutex<Vec<Arc<CaptureRequest>>>,
    ready: ReadyGate,
}

/// Handle to the single physical capture pipeline
pub struct CaptureDevice {
    shared: Arc<Shared>,
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureDevice {
    pub fn new(provider: Arc<dyn CaptureProvider>) -> Result<Self, CaptureError> {
        let shared = Arc::new(Shared {
            provider,
            started: AtomicBool::new(false),
            wanted: AtomicBool::new(false),
            bound_device: Mutex::new(None),
            bound_requests: Mutex::new(Vec::new()),
            ready: ReadyGate::new(),
        });

        let (tx, rx) = unbounded();
        let worker_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("capture-device".into())
            .spawn(move || worker_loop(worker_shared, rx))
            .map_err(|e| CaptureError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            shared,
            tx,
            thread: Some(thread),
        })
    }

    /// Whether the last issued command was `start`
    ///
    /// Reflects `start`/`stop` immediately, before the worker gets to them.
    pub fn is_started(&self) -> bool {
        self.shared.wanted.load(Ordering::SeqCst)
    }

    /// Begin producing frames; repeated calls have no effect
    pub fn start(&self) {
        self.shared.wanted.store(true, Ordering::SeqCst);
        self.send(Command::Start);
    }

    /// Stop the pipeline
    pub fn stop(&self) {
        self.shared.wanted.store(false, Ordering::SeqCst);
        self.send(Command::Stop);
    }

    /// Replace the bound request set
    pub fn bind(&self, selector: DeviceSelector, requests: Vec<Arc<CaptureRequest>>) {
        self.send(Command::Bind { selector, requests });
    }

    pub fn unbind_all(&self) {
        self.send(Command::UnbindAll);
    }

    /// Wait until every previously issued command has run
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Sync(tx));
        let _ = rx.await;
    }

    /// Id of the device the current binding landed on
    pub fn bound_device(&self) -> Option<String> {
        self.shared.bound_device.lock().clone()
    }

    /// Requests in the current binding, in bind order
    pub fn bound_requests(&self) -> Vec<Arc<CaptureRequest>> {
        self.shared.bound_requests.lock().clone()
    }

    pub fn provider(&self) -> &Arc<dyn CaptureProvider> {
        &self.shared.provider
    }

    /// Capabilities of `device_id`
    ///
    /// Blocks until the provider first becomes ready, then answers directly.
    pub fn characteristics(&self, device_id: &str) -> Option<DeviceCharacteristics> {
        if !self.shared.ready.wait() {
            warn!(device_id, "Unable to query characteristics: provider unavailable");
            return None;
        }
        self.shared.provider.characteristics(device_id)
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            error!("Capture worker is gone, command dropped");
        }
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, rx: Receiver<Command>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build capture runtime: {}", e);
            shared.ready.resolve(false);
            return;
        }
    };

    let ready = match runtime.block_on(shared.provider.ready()) {
        Ok(()) => {
            debug!("Capture provider ready");
            true
        }
        Err(e) => {
            error!("Capture provider initialization failed: {}", e);
            false
        }
    };
    shared.ready.resolve(ready);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Sync(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => break,
            // Provider never came up; everything else is skipped
            _ if !ready => {}
            cmd => runtime.block_on(execute(&shared, cmd)),
        }
    }

    if ready && shared.started.load(Ordering::SeqCst) {
        runtime.block_on(async {
            shared.provider.unbind_all().await;
            shared.provider.set_running(false).await;
        });
    }
    debug!("Capture worker stopped");
}

async fn execute(shared: &Shared, cmd: Command) {
    match cmd {
        Command::Start => {
            if !shared.started.swap(true, Ordering::SeqCst) {
                shared.provider.set_running(true).await;
                info!("Capture pipeline started");
            }
        }
        Command::Stop => {
            if shared.started.swap(false, Ordering::SeqCst) {
                shared.provider.set_running(false).await;
                info!("Capture pipeline stopped");
            }
        }
        Command::Bind { selector, requests } => {
            match shared.provider.bind(&selector, &requests).await {
                Ok(device_id) => {
                    debug!(device = %device_id, count = requests.len(), "Requests bound");
                    *shared.bound_device.lock() = Some(device_id);
                    *shared.bound_requests.lock() = requests;
                }
                Err(e) => {
                    // Previous binding stays in place
                    error!(selector = ?selector, "Request binding failed: {}", e);
                }
            }
        }
        Command::UnbindAll => {
            shared.provider.unbind_all().await;
            *shared.bound_device.lock() = None;
            shared.bound_requests.lock().clear();
        }
        Command::Sync(_) | Command::Shutdown => {}
    }
}
