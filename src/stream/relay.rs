//! Relays bridge captured media into engine streams
//!
//! A relay is owned by its session runner, which destroys it. Capture targets
//! only borrow it for the life of one stream task. Every call after `destroy`
//! fails with `InvalidState`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::camera::request::VideoFrame;
use crate::error::EngineError;
use crate::model::{AudioConfig, Resolution, VideoEncodeParams};
use crate::stream::engine::{AudioStreamHandle, EngineResult, VideoStreamHandle};

/// Counters kept by a relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub sent: u64,
    pub failed: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl Counters {
    fn record(&self, result: &EngineResult<()>, bytes: usize) {
        match result {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> RelayStats {
        RelayStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Video frames into one engine stream
pub struct VideoRelay {
    id: Uuid,
    params: VideoEncodeParams,
    resolution: Mutex<Resolution>,
    handle: Mutex<Option<Box<dyn VideoStreamHandle>>>,
    counters: Counters,
}

impl VideoRelay {
    pub(crate) fn new(handle: Box<dyn VideoStreamHandle>, params: VideoEncodeParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            params,
            resolution: Mutex::new(params.resolution),
            handle: Mutex::new(Some(handle)),
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Encoder parameters the relay was built with
    pub fn params(&self) -> &VideoEncodeParams {
        &self.params
    }

    /// Resolution currently configured on the encoder input
    pub fn resolution(&self) -> Resolution {
        *self.resolution.lock()
    }

    pub fn send(&self, frame: &VideoFrame) -> EngineResult<()> {
        let result = self.with_handle(|h| h.send(frame));
        self.counters.record(&result, frame.byte_len());
        result
    }

    pub fn set_resolution(&self, resolution: Resolution) -> EngineResult<()> {
        self.with_handle(|h| h.set_resolution(resolution))?;
        *self.resolution.lock() = resolution;
        Ok(())
    }

    pub fn start(&self) -> EngineResult<()> {
        self.with_handle(|h| h.start())
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.with_handle(|h| h.stop())
    }

    /// Release the engine stream; later calls are no-ops
    pub fn destroy(&self) {
        if let Some(mut handle) = self.handle.lock().take() {
            handle.destroy();
            debug!(relay = %self.id, "Video relay destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.lock().is_none()
    }

    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    fn with_handle<T>(&self, f: impl FnOnce(&mut dyn VideoStreamHandle) -> EngineResult<T>) -> EngineResult<T> {
        match self.handle.lock().as_mut() {
            Some(handle) => f(handle.as_mut()),
            None => Err(EngineError::InvalidState),
        }
    }
}

impl std::fmt::Debug for VideoRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRelay")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// PCM blocks into one engine stream
pub struct AudioRelay {
    id: Uuid,
    config: AudioConfig,
    handle: Mutex<Option<Box<dyn AudioStreamHandle>>>,
    counters: Counters,
}

impl AudioRelay {
    pub(crate) fn new(handle: Box<dyn AudioStreamHandle>, config: AudioConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            handle: Mutex::new(Some(handle)),
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn send(&self, timestamp_ns: u64, samples: &[u8]) -> EngineResult<()> {
        let result = self.with_handle(|h| h.send(timestamp_ns, samples));
        self.counters.record(&result, samples.len());
        result
    }

    pub fn start(&self) -> EngineResult<()> {
        self.with_handle(|h| h.start())
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.with_handle(|h| h.stop())
    }

    pub fn destroy(&self) {
        if let Some(mut handle) = self.handle.lock().take() {
            handle.destroy();
            debug!(relay = %self.id, "Audio relay destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.lock().is_none()
    }

    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    fn with_handle<T>(&self, f: impl FnOnce(&mut dyn AudioStreamHandle) -> EngineResult<T>) -> EngineResult<T> {
        match self.handle.lock().as_mut() {
            Some(handle) => f(handle.as_mut()),
            None => Err(EngineError::InvalidState),
        }
    }
}

impl std::fmt::Debug for AudioRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRelay")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
