//! Remote-control protocol client boundary
//!
//! The wire client is consumed through [`ObsConnector`] / [`ObsSession`]. Its
//! failures arrive as [`ObsClientError`] and are classified into the closed
//! [`ObsError`] taxonomy right here.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ObsConfig;
use crate::error::{AuthFailure, ObsError};

/// Which server events the session subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSubscription {
    #[default]
    None,
    All,
}

/// Parameters for opening a remote-control session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub events: EventSubscription,
}

impl From<&ObsConfig> for SessionParams {
    fn from(config: &ObsConfig) -> Self {
        Self {
            host: config.url.clone(),
            port: config.port,
            password: (!config.password.is_empty()).then(|| config.password.clone()),
            events: EventSubscription::None,
        }
    }
}

/// Failure categories reported by the wire client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObsClientError {
    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    #[error("request failed ({code}): {comment}")]
    Request { code: u16, comment: String },

    #[error("unresolved host")]
    UnresolvedHost,

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("{0}")]
    Other(String),
}

impl From<ObsClientError> for ObsError {
    fn from(err: ObsClientError) -> Self {
        match err {
            ObsClientError::Auth(kind) => ObsError::AuthFailed(kind),
            ObsClientError::Request { code, comment } => ObsError::RequestFailed { code, comment },
            ObsClientError::UnresolvedHost => ObsError::UnknownHost,
            ObsClientError::ConnectTimeout => ObsError::ConnectionTimeout,
            ObsClientError::ConnectionRefused => ObsError::ConnectionRefused,
            ObsClientError::Other(msg) => ObsError::Unknown(msg),
        }
    }
}

pub type ClientResult<T> = Result<T, ObsClientError>;

/// A scene as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneRef {
    pub name: String,
    pub uuid: String,
}

/// An input placed in a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItem {
    pub id: i64,
    pub input_name: String,
    pub enabled: bool,
}

/// Opens remote-control sessions
#[async_trait]
pub trait ObsConnector: Send + Sync {
    async fn connect(&self, params: &SessionParams) -> ClientResult<Box<dyn ObsSession>>;
}

/// An authenticated remote-control session
#[async_trait]
pub trait ObsSession: Send {
    async fn input_kinds(&mut self) -> ClientResult<Vec<String>>;

    async fn current_program_scene(&mut self) -> ClientResult<SceneRef>;

    /// Create a scene, returning its uuid
    async fn create_scene(&mut self, name: &str) -> ClientResult<String>;

    async fn scene_items(&mut self, scene_uuid: &str) -> ClientResult<Vec<SceneItem>>;

    async fn set_scene_item_enabled(&mut self, scene_uuid: &str, item_id: i64, enabled: bool) -> ClientResult<()>;

    async fn create_input(&mut self, scene_uuid: &str, name: &str, kind: &str, settings: Value) -> ClientResult<()>;

    async fn close(&mut self);
}

/// Inputs the handler knows how to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Network media source reading the stream URL
    Media { url: String, speed: u32 },
}

impl InputKind {
    pub fn media(url: impl Into<String>) -> Self {
        InputKind::Media {
            url: url.into(),
            speed: 100,
        }
    }

    /// Kind identifier understood by the remote
    pub fn name(&self) -> &'static str {
        match self {
            InputKind::Media { .. } => "ffmpeg_source",
        }
    }

    pub fn settings(&self) -> Value {
        match self {
            InputKind::Media { url, speed } => json!({
                "input": url,
                "is_local_file": false,
                "speed": speed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_input_settings() {
        let kind = InputKind::media("udp://10.0.0.2:9000");
        assert_eq!(kind.name(), "ffmpeg_source");
        assert_eq!(
            kind.settings(),
            json!({"input": "udp://10.0.0.2:9000", "is_local_file": false, "speed": 100})
        );
    }

    #[test]
    fn empty_password_means_no_auth() {
        let params = SessionParams::from(&ObsConfig::new("host", 4455, ""));
        assert_eq!(params.password, None);
        assert_eq!(params.events, EventSubscription::None);

        let params = SessionParams::from(&ObsConfig::new("host", 4455, "pw"));
        assert_eq!(params.password.as_deref(), Some("pw"));
    }

    #[test]
    fn client_errors_classified() {
        assert_eq!(ObsError::from(ObsClientError::UnresolvedHost), ObsError::UnknownHost);
        assert_eq!(
            ObsError::from(ObsClientError::Auth(AuthFailure::InvalidPassword)),
            ObsError::AuthFailed(AuthFailure::InvalidPassword)
        );
        assert_eq!(
            ObsError::from(ObsClientError::Other("tls".into())),
            ObsError::Unknown("tls".into())
        );
    }
}
