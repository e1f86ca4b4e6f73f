use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, StreamError};
use crate::model::{AudioConfig, StreamProtocol, VideoConfig};
use crate::stream::engine::{EngineOutput, TranscodeEngine};
use crate::stream::relay::{AudioRelay, VideoRelay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputPhase {
    Closed,
    Open,
    Destroyed,
}

struct Inner {
    engine: Option<Box<dyn EngineOutput>>,
    phase: OutputPhase,
}

/// Network output of one session, bound to {protocol, host}
pub struct StreamOutput {
    protocol: StreamProtocol,
    host: String,
    inner: Mutex<Inner>,
}

impl StreamOutput {
    pub fn new(engine: &dyn TranscodeEngine, protocol: StreamProtocol, host: &str) -> Result<Self, StreamError> {
        let output = engine.create_output(protocol, host)?;
        debug!(protocol = ?protocol, host, "Stream output created");

        Ok(Self {
            protocol,
            host: host.to_string(),
            inner: Mutex::new(Inner {
                engine: Some(output),
                phase: OutputPhase::Closed,
            }),
        })
    }

    pub fn protocol(&self) -> StreamProtocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().phase == OutputPhase::Open
    }

    pub fn open(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        if inner.phase == OutputPhase::Open {
            return Ok(());
        }
        let engine = inner.engine.as_mut().ok_or(EngineError::InvalidState)?;
        engine.open()?;
        inner.phase = OutputPhase::Open;
        info!(host = %self.host, "Stream output opened");
        Ok(())
    }

    /// Close if open; closing a closed output is a no-op
    pub fn close(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        if inner.phase != OutputPhase::Open {
            return Ok(());
        }
        inner.phase = OutputPhase::Closed;
        let engine = inner.engine.as_mut().ok_or(EngineError::InvalidState)?;
        engine.close()?;
        info!(host = %self.host, "Stream output closed");
        Ok(())
    }

    /// Build a video relay; `InvalidState` if any encoder field is unset
    pub fn make_video_relay(&self, config: &VideoConfig) -> Result<Arc<VideoRelay>, StreamError> {
        let Some(params) = config.encode_params() else {
            warn!(config = ?config, "Unable to create encoder: incomplete video config");
            return Err(EngineError::InvalidState.into());
        };

        let mut inner = self.inner.lock();
        let engine = inner.engine.as_mut().ok_or(EngineError::InvalidState)?;
        let handle = engine.make_video_stream(&params)?;
        Ok(Arc::new(VideoRelay::new(handle, params)))
    }

    pub fn make_audio_relay(&self, config: &AudioConfig) -> Result<Arc<AudioRelay>, StreamError> {
        let mut inner = self.inner.lock();
        let engine = inner.engine.as_mut().ok_or(EngineError::InvalidState)?;
        let handle = engine.make_audio_stream(config)?;
        Ok(Arc::new(AudioRelay::new(handle, *config)))
    }

    /// Close if still open, then release the engine output. Idempotent.
    pub fn destroy(&self) {
        if let Err(e) = self.close() {
            warn!(host = %self.host, "Failed to close output before destroy: {}", e);
        }

        let mut inner = self.inner.lock();
        if let Some(mut engine) = inner.engine.take() {
            engine.destroy();
            debug!(host = %self.host, "Stream output destroyed");
        }
        inner.phase = OutputPhase::Destroyed;
    }
}

impl std::fmt::Debug for StreamOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutput")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("phase", &self.inner.lock().phase)
            .finish()
    }
}
