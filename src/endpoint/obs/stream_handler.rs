use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ObsStreamData;
use crate::error::StreamError;
use crate::state::StateCell;
use crate::stream::{AudioTarget, SessionConfig, SessionManager, VideoTarget};

/// Media session state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHandlerState {
    Stopped(Option<StreamError>),
    Connecting,
    Started,
}

impl Default for StreamHandlerState {
    fn default() -> Self {
        StreamHandlerState::Stopped(None)
    }
}

struct StreamJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamJob {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!("Stream job panicked: {}", e);
            }
        }
    }
}

type StartSignal = Arc<Mutex<Option<oneshot::Sender<Result<(), StreamError>>>>>;

fn signal(slot: &StartSignal, result: Result<(), StreamError>) {
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(result);
    }
}

/// Keeps a session runner in use for as long as the endpoint streams
pub struct StreamHandler {
    manager: Arc<SessionManager>,
    video: Arc<dyn VideoTarget>,
    audio: Option<Arc<dyn AudioTarget>>,
    state: StateCell<StreamHandlerState>,
    job: tokio::sync::Mutex<Option<StreamJob>>,
}

impl StreamHandler {
    pub fn new(manager: Arc<SessionManager>, video: Arc<dyn VideoTarget>, audio: Option<Arc<dyn AudioTarget>>) -> Self {
        Self {
            manager,
            video,
            audio,
            state: StateCell::new(StreamHandlerState::default()),
            job: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> &StateCell<StreamHandlerState> {
        &self.state
    }

    /// Start streaming `data`
    ///
    /// Returns once the runner is in use or has failed to start. A job from a
    /// previous start is stopped first.
    pub async fn start(&self, data: Option<&ObsStreamData>) -> StreamHandlerState {
        let mut job = self.job.lock().await;
        self.state.set(StreamHandlerState::Connecting);

        let Some(data) = data else {
            warn!("No stream data, not starting session");
            self.state.set(StreamHandlerState::Stopped(None));
            return self.state.get();
        };

        let config = SessionConfig::from_stream_data(data, self.video.clone(), self.audio.clone());
        let runner = match self.manager.get_or_build(config).await {
            Ok(runner) => runner,
            Err(e) => {
                warn!("Unable to start stream handler: {}", e);
                self.state.set(StreamHandlerState::Stopped(Some(e)));
                return self.state.get();
            }
        };

        if let Some(previous) = job.take() {
            debug!("Replacing running stream job");
            previous.stop().await;
        }

        let (tx, rx) = oneshot::channel();
        let started: StartSignal = Arc::new(Mutex::new(Some(tx)));
        let cancel = CancellationToken::new();

        let handle = {
            let state = self.state.clone();
            let cancel = cancel.clone();
            let started = started.clone();
            tokio::spawn(async move {
                let on_start = started.clone();
                let running = state.clone();
                let result = runner
                    .run(async move {
                        running.set(StreamHandlerState::Started);
                        signal(&on_start, Ok(()));
                        cancel.cancelled().await;
                    })
                    .await;

                info!(runner = %runner.id(), "Stream job finished");
                state.set(StreamHandlerState::Stopped(result.err()));
                signal(&started, result);
            })
        };
        *job = Some(StreamJob { cancel, handle });

        match rx.await {
            Ok(Ok(())) => StreamHandlerState::Started,
            Ok(Err(e)) => StreamHandlerState::Stopped(Some(e)),
            Err(_) => self.state.get(),
        }
    }

    /// Cancel the stream job and wait for the session to close
    pub async fn stop(&self) -> StreamHandlerState {
        if let Some(job) = self.job.lock().await.take() {
            job.stop().await;
        }
        self.state.get()
    }
}
