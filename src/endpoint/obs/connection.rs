use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{ObsConfig, ObsStreamData};
use crate::constants::{FALLBACK_SCENE_NAME, STREAM_INPUT_NAME};
use crate::endpoint::obs::client::{InputKind, ObsClientError, ObsConnector, ObsSession, SessionParams};
use crate::error::ObsError;
use crate::state::StateCell;

/// Remote-control connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Started,
    Connecting,
    Stopped(Option<ObsError>),
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Stopped(None)
    }
}

/// Open a session, bounded by the configured connect timeout
async fn open_session(connector: &dyn ObsConnector, config: &ObsConfig) -> Result<Box<dyn ObsSession>, ObsError> {
    let params = SessionParams::from(config);
    let limit = Duration::from_millis(config.connect_timeout_ms);

    match tokio::time::timeout(limit, connector.connect(&params)).await {
        Ok(session) => session.map_err(ObsError::from),
        Err(_) => {
            warn!(host = %config.url, port = config.port, "Handshake timed out after {:?}", limit);
            Err(ObsError::ConnectionTimeout)
        }
    }
}

/// Handshake-only dry run: connect, then close without touching scenes
pub async fn check_connection(connector: &dyn ObsConnector, config: &ObsConfig) -> Result<(), ObsError> {
    let mut session = open_session(connector, config).await?;
    session.close().await;
    Ok(())
}

/// Make sure the stream input exists and is visible in the active scene
pub(crate) async fn setup_scene(session: &mut dyn ObsSession, data: &ObsStreamData) -> Result<(), ObsError> {
    ensure_stream_input(session, STREAM_INPUT_NAME, &InputKind::media(data.host.clone())).await
}

async fn ensure_stream_input(session: &mut dyn ObsSession, name: &str, kind: &InputKind) -> Result<(), ObsError> {
    let kinds = session.input_kinds().await?;
    if !kinds.iter().any(|k| k == kind.name()) {
        error!("Remote doesn't support '{}' input kind", kind.name());
        return Err(ObsError::UnknownInput(kind.name().to_string()));
    }

    let scene = active_scene(session).await?;
    let items = session.scene_items(&scene).await?;

    match items.iter().find(|item| item.input_name == name) {
        Some(item) if item.enabled => {
            debug!(input = name, "Stream input already present");
        }
        Some(item) => {
            info!(input = name, "Stream input hidden, making it visible");
            session.set_scene_item_enabled(&scene, item.id, true).await?;
        }
        None => {
            info!(input = name, kind = kind.name(), "Creating stream input");
            session.create_input(&scene, name, kind.name(), kind.settings()).await?;
        }
    }

    Ok(())
}

/// Uuid of the current program scene, creating a fallback scene if the
/// remote can't report one
async fn active_scene(session: &mut dyn ObsSession) -> Result<String, ObsError> {
    match session.current_program_scene().await {
        Ok(scene) => Ok(scene.uuid),
        Err(e @ ObsClientError::Request { .. }) => {
            warn!("Failed to get current scene: {}", e);
            info!("Creating fallback scene '{}'", FALLBACK_SCENE_NAME);
            session.create_scene(FALLBACK_SCENE_NAME).await.map_err(|e| {
                error!("Failed to create fallback scene: {}", e);
                ObsError::from(e)
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Drives the remote-control side of an endpoint
pub struct ConnectionHandler {
    config: ObsConfig,
    connector: Arc<dyn ObsConnector>,
    state: StateCell<ConnectionState>,
}

impl ConnectionHandler {
    pub fn new(config: ObsConfig, connector: Arc<dyn ObsConnector>) -> Self {
        Self {
            config,
            connector,
            state: StateCell::new(ConnectionState::default()),
        }
    }

    pub fn state(&self) -> &StateCell<ConnectionState> {
        &self.state
    }

    /// Connect and prepare the scene for `data`
    ///
    /// Without stream data nothing is sent over the network and the handler
    /// stops with `NotHaveData`.
    pub async fn start(&self, data: Option<&ObsStreamData>) -> ConnectionState {
        let Some(data) = data else {
            warn!("No stream data, not connecting");
            self.state.set(ConnectionState::Stopped(Some(ObsError::NotHaveData)));
            return self.state.get();
        };

        self.state.set(ConnectionState::Connecting);

        let result = match open_session(self.connector.as_ref(), &self.config).await {
            Ok(mut session) => {
                info!(host = %self.config.url, "Connected to the endpoint");
                let setup = setup_scene(session.as_mut(), data).await;
                session.close().await;
                setup
            }
            Err(e) => Err(e),
        };

        let next = match result {
            Ok(()) => ConnectionState::Started,
            Err(e) => {
                warn!(host = %self.config.url, "Connection failed: {}", e);
                ConnectionState::Stopped(Some(e))
            }
        };
        self.state.set(next.clone());
        next
    }

    // The stream input is left in the scene
    pub fn stop(&self) -> ConnectionState {
        self.state.set(ConnectionState::Stopped(None));
        self.state.get()
    }
}
