//! Application-facing endpoint handler
//!
//! Tracks the endpoint built from the latest persisted configuration,
//! forwards its state, and keeps the outer service running while it streams.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigSource, EndpointConfig};
use crate::endpoint::obs::{self, ObsConnector, ObsEndpoint, StreamHandler};
use crate::endpoint::{Endpoint, EndpointResult, EndpointState};
use crate::state::StateCell;
use crate::stream::{AudioTarget, SessionManager, VideoTarget};

/// Hooks into the process hosting the endpoint
pub trait ServiceHooks: Send + Sync {
    /// Bring up the foreground service that keeps streaming alive
    fn start_service(&self);

    fn stop_service(&self);

    /// Take the wake and network locks
    fn acquire_locks(&self);

    fn release_locks(&self);
}

/// Hooks for hosts without an outer service
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopServiceHooks;

impl ServiceHooks for NoopServiceHooks {
    fn start_service(&self) {}
    fn stop_service(&self) {}
    fn acquire_locks(&self) {}
    fn release_locks(&self) {}
}

/// Running service plus held locks; both are released on drop
pub struct ServiceLease {
    hooks: Arc<dyn ServiceHooks>,
}

impl ServiceLease {
    pub fn new(hooks: Arc<dyn ServiceHooks>) -> Self {
        hooks.start_service();
        hooks.acquire_locks();
        debug!("Service lease acquired");
        Self { hooks }
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        self.hooks.release_locks();
        self.hooks.stop_service();
        debug!("Service lease released");
    }
}

struct Active {
    config: EndpointConfig,
    endpoint: Arc<dyn Endpoint>,
    forwarder: JoinHandle<()>,
}

/// Owns the current endpoint and the service lease while it streams
pub struct EndpointHandler {
    source: Arc<dyn ConfigSource>,
    connector: Arc<dyn ObsConnector>,
    manager: Arc<SessionManager>,
    video: Arc<dyn VideoTarget>,
    audio: Option<Arc<dyn AudioTarget>>,
    hooks: Arc<dyn ServiceHooks>,
    active: Mutex<Option<Active>>,
    lease: Mutex<Option<ServiceLease>>,
    state: StateCell<EndpointState>,
}

impl EndpointHandler {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        connector: Arc<dyn ObsConnector>,
        manager: Arc<SessionManager>,
        video: Arc<dyn VideoTarget>,
    ) -> Self {
        Self {
            source,
            connector,
            manager,
            video,
            audio: None,
            hooks: Arc::new(NoopServiceHooks),
            active: Mutex::new(None),
            lease: Mutex::new(None),
            state: StateCell::new(EndpointState::default()),
        }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioTarget>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ServiceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// State of the current endpoint, or `Stopped(EndpointNotConfigured)`
    pub fn state(&self) -> &StateCell<EndpointState> {
        &self.state
    }

    pub fn endpoint(&self) -> Option<Arc<dyn Endpoint>> {
        self.active.lock().as_ref().map(|a| a.endpoint.clone())
    }

    pub fn is_service_held(&self) -> bool {
        self.lease.lock().is_some()
    }

    /// Endpoint for the latest persisted configuration
    ///
    /// A changed configuration replaces the current endpoint, which is then
    /// disconnected. Concurrent callers race on a single slot and the last
    /// write wins.
    pub async fn retrieve_latest_endpoint(&self) -> Option<Arc<dyn Endpoint>> {
        let latest = self.source.endpoint_config();

        let replaced = {
            let mut active = self.active.lock();
            if let (Some(current), Some(config)) = (active.as_ref(), latest.as_ref()) {
                if current.config == *config {
                    return Some(current.endpoint.clone());
                }
            }

            let next = latest.map(|config| {
                let endpoint = self.make_endpoint(&config);
                let forwarder = self.forward_state(&endpoint);
                Active {
                    config,
                    endpoint,
                    forwarder,
                }
            });
            if next.is_none() {
                self.state.set(EndpointState::default());
            }
            std::mem::replace(&mut *active, next)
        };

        if let Some(old) = replaced {
            info!("Endpoint configuration changed, disconnecting previous endpoint");
            old.forwarder.abort();
            old.endpoint.disconnect().await;
            self.lease.lock().take();
        }

        self.endpoint()
    }

    /// Connect the latest endpoint
    ///
    /// The outer service stays up only if the endpoint started. Reconnecting
    /// while streaming keeps the running service.
    pub async fn connect(&self) -> EndpointState {
        let Some(endpoint) = self.retrieve_latest_endpoint().await else {
            warn!("Unable to connect: no endpoint configured");
            return EndpointState::default();
        };

        // An already held lease carries over; only a fresh one is taken here
        let fresh = if self.is_service_held() {
            None
        } else {
            Some(ServiceLease::new(self.hooks.clone()))
        };
        let state = endpoint.connect().await;

        if state.is_started() {
            if let Some(lease) = fresh {
                self.lease.lock().get_or_insert(lease);
            }
        } else {
            warn!(?state, "Endpoint did not start");
            drop(fresh);
            self.lease.lock().take();
        }
        state
    }

    pub async fn disconnect(&self) -> EndpointState {
        let Some(endpoint) = self.endpoint() else {
            return EndpointState::default();
        };

        let state = endpoint.disconnect().await;
        if state.is_stopped() {
            self.lease.lock().take();
        }
        state
    }

    /// Handshake-only check of `config`; nothing is persisted or started
    pub async fn check_connection(&self, config: &EndpointConfig) -> EndpointResult {
        let result = match config {
            EndpointConfig::Obs(obs) => obs::check_connection(self.connector.as_ref(), obs).await,
        };

        match result {
            Ok(()) => EndpointResult::Success,
            Err(e) => {
                debug!("Connection check failed: {}", e);
                EndpointResult::Error(e.into())
            }
        }
    }

    fn make_endpoint(&self, config: &EndpointConfig) -> Arc<dyn Endpoint> {
        match config {
            EndpointConfig::Obs(obs) => {
                let stream = StreamHandler::new(self.manager.clone(), self.video.clone(), self.audio.clone());
                Arc::new(ObsEndpoint::new(
                    obs.clone(),
                    self.connector.clone(),
                    stream,
                    self.source.clone(),
                ))
            }
        }
    }

    fn forward_state(&self, endpoint: &Arc<dyn Endpoint>) -> JoinHandle<()> {
        let mut rx = endpoint.state().subscribe();
        let out = self.state.clone();
        tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                out.set(state);
            }
        })
    }
}

impl Drop for EndpointHandler {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.forwarder.abort();
        }
    }
}
