use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ConfigSource, EndpointConfig, ObsConfig};
use crate::endpoint::obs::client::ObsConnector;
use crate::endpoint::obs::connection::{ConnectionHandler, ConnectionState};
use crate::endpoint::obs::stream_handler::{StreamHandler, StreamHandlerState};
use crate::endpoint::{combine_state, Endpoint, EndpointState};
use crate::state::StateCell;

/// OBS endpoint: remote scene setup plus the media session it plays
///
/// Must be created inside a tokio runtime; a background task keeps the
/// combined state in sync with both handlers.
pub struct ObsEndpoint {
    config: ObsConfig,
    source: Arc<dyn ConfigSource>,
    conn: Arc<ConnectionHandler>,
    stream: Arc<StreamHandler>,
    state: StateCell<EndpointState>,
    combiner: JoinHandle<()>,
}

impl ObsEndpoint {
    pub fn new(
        config: ObsConfig,
        connector: Arc<dyn ObsConnector>,
        stream: StreamHandler,
        source: Arc<dyn ConfigSource>,
    ) -> Self {
        let conn = Arc::new(ConnectionHandler::new(config.clone(), connector));
        let stream = Arc::new(stream);
        let state = StateCell::new(combine_state(&conn.state().get(), &stream.state().get()));
        let combiner = spawn_combiner(&conn, &stream, state.clone());

        Self {
            config,
            source,
            conn,
            stream,
            state,
            combiner,
        }
    }

    pub fn obs_config(&self) -> &ObsConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state().get()
    }

    pub fn stream_state(&self) -> StreamHandlerState {
        self.stream.state().get()
    }

    fn publish(&self) -> EndpointState {
        let combined = combine_state(&self.conn.state().get(), &self.stream.state().get());
        self.state.set(combined.clone());
        combined
    }
}

fn spawn_combiner(conn: &ConnectionHandler, stream: &StreamHandler, out: StateCell<EndpointState>) -> JoinHandle<()> {
    let mut conn_rx = conn.state().subscribe();
    let mut stream_rx = stream.state().subscribe();

    tokio::spawn(async move {
        let mut conn = ConnectionState::default();
        let mut stream = StreamHandlerState::default();

        loop {
            tokio::select! {
                next = conn_rx.recv() => match next {
                    Some(state) => conn = state,
                    None => break,
                },
                next = stream_rx.recv() => match next {
                    Some(state) => stream = state,
                    None => break,
                },
            }

            let combined = combine_state(&conn, &stream);
            debug!(?conn, ?stream, ?combined, "Endpoint state");
            out.set(combined);
        }
    })
}

#[async_trait]
impl Endpoint for ObsEndpoint {
    fn config(&self) -> EndpointConfig {
        EndpointConfig::Obs(self.config.clone())
    }

    fn state(&self) -> StateCell<EndpointState> {
        self.state.clone()
    }

    async fn connect(&self) -> EndpointState {
        let data = self.source.stream_data();
        info!(host = %self.config.url, "Connecting endpoint");

        let (conn, stream) = tokio::join!(self.conn.start(data.as_ref()), self.stream.start(data.as_ref()));
        debug!(?conn, ?stream, "Endpoint handlers settled");

        self.publish()
    }

    async fn disconnect(&self) -> EndpointState {
        self.stream.stop().await;
        self.conn.stop();
        info!(host = %self.config.url, "Endpoint disconnected");

        self.publish()
    }
}

impl Drop for ObsEndpoint {
    fn drop(&mut self) {
        self.combiner.abort();
    }
}
