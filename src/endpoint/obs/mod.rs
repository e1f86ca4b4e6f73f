//! OBS endpoint
//!
//! [`ConnectionHandler`] prepares the remote scene over the remote-control
//! protocol while [`StreamHandler`] keeps the media session running.
//! [`ObsEndpoint`] drives both and folds their states together.

pub mod client;
mod connection;
mod endpoint;
mod stream_handler;

pub use client::{
    ClientResult, EventSubscription, InputKind, ObsClientError, ObsConnector, ObsSession, SceneItem, SceneRef,
    SessionParams,
};
pub use connection::{check_connection, ConnectionHandler, ConnectionState};
pub use endpoint::ObsEndpoint;
pub use stream_handler::{StreamHandler, StreamHandlerState};
