use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::StreamError;
use crate::model::{PixFmt, VideoCodec};
use crate::stream::engine::TranscodeEngine;
use crate::stream::output::StreamOutput;
use crate::stream::runner::{SessionRunner, Stream};
use crate::stream::session::SessionConfig;
use crate::stream::target::{AudioTargetState, VideoTargetState};

struct Cached {
    config: SessionConfig,
    runner: Arc<SessionRunner>,
}

/// Caches at most one session runner, keyed by its configuration
pub struct SessionManager {
    engine: Arc<dyn TranscodeEngine>,
    current: Mutex<Option<Cached>>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            engine,
            current: Mutex::new(None),
        }
    }

    /// Runner for `config`
    ///
    /// Returns the cached runner when its configuration is equal to `config`.
    /// Otherwise the cached runner is destroyed and a new one built.
    pub async fn get_or_build(&self, config: SessionConfig) -> Result<Arc<SessionRunner>, StreamError> {
        let mut current = self.current.lock().await;

        if let Some(cached) = current.as_ref() {
            if cached.config == config {
                return Ok(cached.runner.clone());
            }
        }

        if let Some(old) = current.take() {
            info!(runner = %old.runner.id(), "Session configuration changed, replacing runner");
            old.runner.destroy().await;
        }

        let runner = Arc::new(self.build(&config)?);
        *current = Some(Cached {
            config,
            runner: runner.clone(),
        });
        Ok(runner)
    }

    /// Runner currently cached, if any
    pub async fn current(&self) -> Option<Arc<SessionRunner>> {
        self.current.lock().await.as_ref().map(|c| c.runner.clone())
    }

    /// Destroy and forget the cached runner
    pub async fn clear(&self) {
        if let Some(old) = self.current.lock().await.take() {
            old.runner.destroy().await;
        }
    }

    pub fn supported_codecs(&self) -> Vec<VideoCodec> {
        self.engine.supported_codecs()
    }

    pub fn supported_formats(&self, codec: VideoCodec) -> Vec<PixFmt> {
        self.engine.supported_formats(codec)
    }

    fn build(&self, config: &SessionConfig) -> Result<SessionRunner, StreamError> {
        if config.host.trim().is_empty() {
            return Err(StreamError::NoHost);
        }

        let output = StreamOutput::new(self.engine.as_ref(), config.protocol, &config.host)?;
        let mut streams = Vec::new();

        if let Some(video) = &config.video {
            match output.make_video_relay(&video.data) {
                Ok(relay) => {
                    let params = *relay.params();
                    streams.push(Stream::Video {
                        target: video.target.clone(),
                        state: VideoTargetState {
                            enabled: true,
                            relay,
                            framerate: Some(params.framerate),
                            resolution: Some(params.resolution),
                        },
                    });
                }
                Err(e) => warn!("Failed to configure video stream: {}", e),
            }
        }

        if let Some(audio) = &config.audio {
            match output.make_audio_relay(&audio.data) {
                Ok(relay) => streams.push(Stream::Audio {
                    target: audio.target.clone(),
                    state: AudioTargetState { enabled: true, relay },
                }),
                Err(e) => warn!("Failed to configure audio stream: {}", e),
            }
        }

        if streams.is_empty() {
            output.destroy();
            return Err(StreamError::NoVideoConfig);
        }

        info!(protocol = ?config.protocol, host = %config.host, streams = streams.len(), "Session runner built");
        Ok(SessionRunner::new(output, streams))
    }
}
