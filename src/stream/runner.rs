//! Session runner: one output plus one task per enabled stream
//!
//! While a runner is in use it holds a scope: a cancellation token and the
//! join handles of its stream tasks. Leaving `run` by any path cancels the
//! scope, waits for every task to finish, and only then closes the output.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, StreamError};
use crate::stream::output::StreamOutput;
use crate::stream::relay::{AudioRelay, VideoRelay};
use crate::stream::session::RelayConfig;
use crate::stream::target::{AudioTarget, AudioTargetState, VideoTarget, VideoTargetState};

/// One media stream of a session
pub(crate) enum Stream {
    Video {
        target: Arc<dyn VideoTarget>,
        state: VideoTargetState,
    },
    Audio {
        target: Arc<dyn AudioTarget>,
        state: AudioTargetState,
    },
}

impl Stream {
    fn enabled(&self) -> bool {
        match self {
            Stream::Video { state, .. } => state.enabled,
            Stream::Audio { state, .. } => state.enabled,
        }
    }

    fn launch(&self, cancel: CancellationToken) -> StreamTask {
        let token = cancel.clone();
        let handle = match self {
            Stream::Video { target, state } => {
                let target = target.clone();
                let state = state.clone();
                tokio::spawn(async move { target.run(state, cancel).await })
            }
            Stream::Audio { target, state } => {
                let target = target.clone();
                let state = state.clone();
                tokio::spawn(async move { target.run(state, cancel).await })
            }
        };
        StreamTask { token, handle }
    }

    fn destroy_relay(&self) {
        match self {
            Stream::Video { state, .. } => state.relay.destroy(),
            Stream::Audio { state, .. } => state.relay.destroy(),
        }
    }
}

struct StreamTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamTask {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("Stream task panicked: {}", e);
            }
        }
    }
}

struct Scope {
    token: CancellationToken,
    generation: u64,
    tasks: HashMap<usize, StreamTask>,
}

impl Scope {
    /// Cancel every task and wait for all of them to finish
    async fn shutdown(self) {
        self.token.cancel();
        for (_, task) in self.tasks {
            task.stop().await;
        }
    }

    fn launch_enabled(&mut self, streams: &[Stream], indices: impl IntoIterator<Item = usize>) {
        for index in indices {
            let Some(stream) = streams.get(index) else {
                continue;
            };
            if stream.enabled() && !self.tasks.contains_key(&index) {
                self.tasks.insert(index, stream.launch(self.token.child_token()));
            }
        }
    }
}

struct RunnerState {
    streams: Vec<Stream>,
    scope: Option<Scope>,
    relay_config: RelayConfig,
    next_generation: u64,
    destroyed: bool,
}

struct Shared {
    id: Uuid,
    output: StreamOutput,
    state: Mutex<RunnerState>,
    // Serializes scope teardown with destroy
    teardown: tokio::sync::Mutex<()>,
    // Serializes stream state replacement
    update: tokio::sync::Mutex<()>,
}

impl Shared {
    fn take_scope(&self, generation: u64) -> Option<Scope> {
        let mut state = self.state.lock();
        match &state.scope {
            Some(scope) if scope.generation == generation => state.scope.take(),
            _ => None,
        }
    }

    fn close_output(&self) {
        if let Err(e) = self.output.close() {
            warn!(runner = %self.id, "Failed to close output: {}", e);
        }
    }
}

/// Releases the scope of one `run` call, also when that call is dropped
struct ScopeGuard {
    shared: Arc<Shared>,
    generation: u64,
    armed: bool,
}

impl ScopeGuard {
    async fn finish(mut self) {
        self.armed = false;
        let _teardown = self.shared.teardown.lock().await;
        if let Some(scope) = self.shared.take_scope(self.generation) {
            scope.shutdown().await;
            self.shared.close_output();
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(scope) = self.shared.take_scope(self.generation) else {
            return;
        };
        scope.token.cancel();

        let shared = self.shared.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _teardown = shared.teardown.lock().await;
                    scope.shutdown().await;
                    shared.close_output();
                });
            }
            Err(_) => {
                for (_, task) in scope.tasks {
                    task.handle.abort();
                }
                shared.close_output();
            }
        }
    }
}

/// Owns a session's output and stream tasks
pub struct SessionRunner {
    shared: Arc<Shared>,
}

impl SessionRunner {
    pub(crate) fn new(output: StreamOutput, streams: Vec<Stream>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                output,
                state: Mutex::new(RunnerState {
                    streams,
                    scope: None,
                    relay_config: RelayConfig::default(),
                    next_generation: 0,
                    destroyed: false,
                }),
                teardown: tokio::sync::Mutex::new(()),
                update: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn output(&self) -> &StreamOutput {
        &self.shared.output
    }

    /// Open the output, start a task per enabled stream, then await `block`
    ///
    /// Fails with `AlreadyStarted` if the runner is already in use. Whether
    /// `block` completes, the runner is destroyed, or this future is dropped,
    /// all stream tasks are cancelled and awaited before the output closes.
    pub async fn run<F>(&self, block: F) -> Result<(), StreamError>
    where
        F: Future<Output = ()>,
    {
        let (token, generation) = {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return Err(EngineError::InvalidState.into());
            }
            if state.scope.is_some() {
                return Err(StreamError::AlreadyStarted);
            }

            let generation = state.next_generation;
            state.next_generation += 1;
            let token = CancellationToken::new();
            state.scope = Some(Scope {
                token: token.clone(),
                generation,
                tasks: HashMap::new(),
            });
            (token, generation)
        };

        let guard = ScopeGuard {
            shared: self.shared.clone(),
            generation,
            armed: true,
        };

        if let Err(e) = self.shared.output.open() {
            error!(runner = %self.shared.id, "Failed to open output: {}", e);
            guard.finish().await;
            return Err(e);
        }

        {
            let mut state = self.shared.state.lock();
            let RunnerState { streams, scope, .. } = &mut *state;
            if let Some(scope) = scope.as_mut().filter(|s| s.generation == generation) {
                scope.launch_enabled(streams, 0..streams.len());
                info!(runner = %self.shared.id, streams = scope.tasks.len(), "Session started");
            }
        }

        tokio::select! {
            _ = block => {}
            _ = token.cancelled() => {
                debug!(runner = %self.shared.id, "Session scope cancelled");
            }
        }

        guard.finish().await;
        info!(runner = %self.shared.id, "Session stopped");
        Ok(())
    }

    /// Replace the state of every video stream
    ///
    /// A running video task is cancelled and awaited before the replacement
    /// starts, so the two never overlap.
    pub async fn update_video_state(&self, new_state: VideoTargetState) {
        let _serial = self.shared.update.lock().await;

        let (stopped, video, generation) = {
            let mut state = self.shared.state.lock();
            let RunnerState { streams, scope, .. } = &mut *state;

            let mut stopped = Vec::new();
            let mut video = Vec::new();
            for (index, stream) in streams.iter_mut().enumerate() {
                if let Stream::Video { state, .. } = stream {
                    *state = new_state.clone();
                    video.push(index);
                    if let Some(task) = scope.as_mut().and_then(|s| s.tasks.remove(&index)) {
                        stopped.push(task);
                    }
                }
            }
            (stopped, video, scope.as_ref().map(|s| s.generation))
        };

        for task in stopped {
            task.stop().await;
        }

        let Some(generation) = generation else {
            return;
        };

        let mut state = self.shared.state.lock();
        let RunnerState { streams, scope, .. } = &mut *state;
        if let Some(scope) = scope.as_mut().filter(|s| s.generation == generation) {
            scope.launch_enabled(streams, video);
            debug!(runner = %self.shared.id, "Video stream state replaced");
        }
    }

    /// Apply a live resolution / framerate change; identical configs are
    /// ignored
    pub async fn apply_relay_config(&self, config: RelayConfig) -> Result<(), StreamError> {
        let (current, video) = {
            let state = self.shared.state.lock();
            let video = state.streams.iter().find_map(|s| match s {
                Stream::Video { state, .. } => Some(state.clone()),
                Stream::Audio { .. } => None,
            });
            (state.relay_config, video)
        };

        if current == config {
            return Ok(());
        }

        let Some(mut video) = video else {
            self.shared.state.lock().relay_config = config;
            return Ok(());
        };

        if let Some(resolution) = config.resolution {
            if video.relay.resolution() != resolution {
                video.relay.set_resolution(resolution)?;
            }
            video.resolution = Some(resolution);
        }
        if config.framerate.is_some() {
            video.framerate = config.framerate;
        }

        self.shared.state.lock().relay_config = config;
        self.update_video_state(video).await;
        Ok(())
    }

    /// Cancel the active scope, destroy every relay, then destroy the output.
    /// Idempotent.
    pub async fn destroy(&self) {
        let _teardown = self.shared.teardown.lock().await;

        let scope = {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.scope.take()
        };

        if let Some(scope) = scope {
            scope.shutdown().await;
        }

        for stream in &self.shared.state.lock().streams {
            stream.destroy_relay();
        }

        self.shared.output.destroy();
        info!(runner = %self.shared.id, "Session runner destroyed");
    }

    pub fn is_in_use(&self) -> bool {
        self.shared.state.lock().scope.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().destroyed
    }

    /// Number of stream tasks currently alive
    pub fn running_streams(&self) -> usize {
        let state = self.shared.state.lock();
        state
            .scope
            .as_ref()
            .map(|s| s.tasks.values().filter(|t| !t.handle.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn relay_config(&self) -> RelayConfig {
        self.shared.state.lock().relay_config
    }

    pub fn video_state(&self) -> Option<VideoTargetState> {
        self.shared.state.lock().streams.iter().find_map(|s| match s {
            Stream::Video { state, .. } => Some(state.clone()),
            Stream::Audio { .. } => None,
        })
    }

    pub fn video_relays(&self) -> Vec<Arc<VideoRelay>> {
        self.shared
            .state
            .lock()
            .streams
            .iter()
            .filter_map(|s| match s {
                Stream::Video { state, .. } => Some(state.relay.clone()),
                Stream::Audio { .. } => None,
            })
            .collect()
    }

    pub fn audio_relays(&self) -> Vec<Arc<AudioRelay>> {
        self.shared
            .state
            .lock()
            .streams
            .iter()
            .filter_map(|s| match s {
                Stream::Audio { state, .. } => Some(state.relay.clone()),
                Stream::Video { .. } => None,
            })
            .collect()
    }
}

impl std::fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRunner")
            .field("id", &self.shared.id)
            .field("output", &self.shared.output)
            .finish()
    }
}
