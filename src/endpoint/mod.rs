//! Endpoint orchestration
//!
//! An endpoint couples a remote-control connection with the media session
//! feeding it. Each half keeps its own state machine; [`combine_state`] folds
//! the pair into one [`EndpointState`] for the outside world.

pub mod handler;
pub mod obs;

pub use handler::{EndpointHandler, NoopServiceHooks, ServiceHooks, ServiceLease};
pub use obs::{ConnectionState, ObsEndpoint, StreamHandlerState};

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::error::{EndpointError, ObsError};
use crate::state::StateCell;

/// Endpoint-level state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    /// Not active, with the reason it stopped if it failed
    Stopped(Option<EndpointError>),
    Connecting,
    /// Media flowing; carries a warning when the remote side failed
    Started(Option<EndpointError>),
}

impl EndpointState {
    pub fn is_started(&self) -> bool {
        matches!(self, EndpointState::Started(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, EndpointState::Stopped(_))
    }

    pub fn error(&self) -> Option<&EndpointError> {
        match self {
            EndpointState::Stopped(err) | EndpointState::Started(err) => err.as_ref(),
            EndpointState::Connecting => None,
        }
    }
}

impl Default for EndpointState {
    fn default() -> Self {
        EndpointState::Stopped(Some(EndpointError::EndpointNotConfigured))
    }
}

/// A remote destination with its own connect / disconnect lifecycle
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn config(&self) -> EndpointConfig;

    /// Observable endpoint state, replayed to late subscribers
    fn state(&self) -> StateCell<EndpointState>;

    async fn connect(&self) -> EndpointState;

    async fn disconnect(&self) -> EndpointState;
}

/// Outcome of a handshake-only connection check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointResult {
    Success,
    Error(EndpointError),
}

/// Fold connection and stream-handler states into one endpoint state
///
/// The endpoint is `Started` exactly when the stream handler is; a remote
/// failure then surfaces as a warning. A stopped endpoint reports the remote
/// failure first, then the stream failure.
pub fn combine_state(conn: &ConnectionState, stream: &StreamHandlerState) -> EndpointState {
    match (stream, conn) {
        (StreamHandlerState::Started, ConnectionState::Stopped(Some(err))) => {
            EndpointState::Started(Some(err.clone().into()))
        }
        (StreamHandlerState::Started, _) => EndpointState::Started(None),
        (StreamHandlerState::Connecting, _) => EndpointState::Connecting,
        (StreamHandlerState::Stopped(_), ConnectionState::Stopped(Some(err))) => {
            EndpointState::Stopped(Some(obs_error(err)))
        }
        (StreamHandlerState::Stopped(Some(err)), _) => EndpointState::Stopped(Some(EndpointError::Stream(*err))),
        (StreamHandlerState::Stopped(None), _) => EndpointState::Stopped(None),
    }
}

fn obs_error(err: &ObsError) -> EndpointError {
    err.clone().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;

    fn conn_states() -> [ConnectionState; 3] {
        [
            ConnectionState::Started,
            ConnectionState::Connecting,
            ConnectionState::Stopped(Some(ObsError::ConnectionRefused)),
        ]
    }

    #[test]
    fn stream_started_with_every_connection_state() {
        let stream = StreamHandlerState::Started;
        let [started, connecting, failed] = conn_states();

        assert_eq!(combine_state(&started, &stream), EndpointState::Started(None));
        assert_eq!(combine_state(&connecting, &stream), EndpointState::Started(None));
        assert_eq!(
            combine_state(&failed, &stream),
            EndpointState::Started(Some(EndpointError::Obs(ObsError::ConnectionRefused)))
        );
    }

    #[test]
    fn stream_connecting_with_every_connection_state() {
        let stream = StreamHandlerState::Connecting;
        for conn in conn_states() {
            assert_eq!(combine_state(&conn, &stream), EndpointState::Connecting);
        }
    }

    #[test]
    fn stream_stopped_with_every_connection_state() {
        let stream = StreamHandlerState::Stopped(Some(StreamError::NoHost));
        let [started, connecting, failed] = conn_states();

        assert_eq!(
            combine_state(&started, &stream),
            EndpointState::Stopped(Some(EndpointError::Stream(StreamError::NoHost)))
        );
        assert_eq!(
            combine_state(&connecting, &stream),
            EndpointState::Stopped(Some(EndpointError::Stream(StreamError::NoHost)))
        );
        assert_eq!(
            combine_state(&failed, &stream),
            EndpointState::Stopped(Some(EndpointError::Obs(ObsError::ConnectionRefused)))
        );
    }

    #[test]
    fn clean_stop_has_no_reason() {
        let stopped = StreamHandlerState::Stopped(None);
        assert_eq!(
            combine_state(&ConnectionState::Stopped(None), &stopped),
            EndpointState::Stopped(None)
        );
        assert_eq!(combine_state(&ConnectionState::Started, &stopped), EndpointState::Stopped(None));
    }

    #[test]
    fn unknown_remote_error_is_reported_as_unknown() {
        let conn = ConnectionState::Stopped(Some(ObsError::Unknown("reset".into())));
        assert_eq!(
            combine_state(&conn, &StreamHandlerState::Started),
            EndpointState::Started(Some(EndpointError::Unknown("reset".into())))
        );
    }

    #[test]
    fn default_state_is_not_configured() {
        assert_eq!(
            EndpointState::default(),
            EndpointState::Stopped(Some(EndpointError::EndpointNotConfigured))
        );
    }
}
