//! Persisted application configuration
//!
//! The configuration is a TOML file with three sections:
//!
//! ```toml
//! [endpoint]
//! type = "obs"
//! url = "192.168.1.10"
//! port = 4455
//! password = ""
//!
//! [stream]
//! protocol = "mpegts"
//! host = "udp://192.168.1.10:9000"
//!
//! [stream.video]
//! codec = "h264"
//! pix_fmt = "nv12"
//! bitrate = 4000000
//! framerate = 30
//! resolution = "1280x720"
//!
//! [camera]
//! device_id = "0"
//! preview_window = "1080x2400"
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::model::{AudioConfig, PixFmt, Resolution, StreamProtocol, VideoCodec, VideoConfig};

/// Remote production tool connection settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObsConfig {
    /// Host name or address of the OBS instance
    pub url: String,

    /// Websocket port
    #[serde(default = "default_obs_port")]
    pub port: u16,

    /// Empty when authentication is disabled
    #[serde(default)]
    pub password: String,

    /// Handshake timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_obs_port() -> u16 {
    DEFAULT_OBS_PORT
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl ObsConfig {
    pub fn new(url: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            port,
            password: password.into(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// Endpoint kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointConfig {
    Obs(ObsConfig),
}

/// What to stream and where
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObsStreamData {
    #[serde(default)]
    pub protocol: StreamProtocol,

    /// Destination URL the engine writes to and OBS reads from
    pub host: String,

    #[serde(default = "default_video_config")]
    pub video: VideoConfig,

    #[serde(default)]
    pub audio: Option<AudioConfig>,
}

fn default_video_config() -> VideoConfig {
    VideoConfig {
        codec: Some(VideoCodec::H264),
        pix_fmt: Some(PixFmt::Nv12),
        bitrate: Some(DEFAULT_VIDEO_BITRATE),
        framerate: Some(DEFAULT_FRAMERATE),
        resolution: Some(HD),
    }
}

impl ObsStreamData {
    pub fn new(protocol: StreamProtocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            video: default_video_config(),
            audio: None,
        }
    }
}

/// Camera preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Preferred device, first available when unset
    pub device_id: Option<String>,

    /// Window the preview is shown in; bounds the preview size
    #[serde(default)]
    pub preview_window: Option<Resolution>,
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoint: Option<EndpointConfig>,

    #[serde(default)]
    pub stream: Option<ObsStreamData>,

    #[serde(default)]
    pub camera: CameraSettings,
}

impl AppConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, falling back to defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Platform config location, e.g. `~/.config/camrelay/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        directories::ProjectDirs::from("", "", "camrelay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| Error::Config("unable to resolve home directory".into()))
    }
}

/// Supplies the latest persisted endpoint and stream settings
pub trait ConfigSource: Send + Sync {
    fn endpoint_config(&self) -> Option<EndpointConfig>;

    fn stream_data(&self) -> Option<ObsStreamData>;
}

/// Re-reads a TOML file on every call
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Option<AppConfig> {
        match AppConfig::load_or_default(&self.path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read config: {}", e);
                None
            }
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn endpoint_config(&self) -> Option<EndpointConfig> {
        self.load().and_then(|c| c.endpoint)
    }

    fn stream_data(&self) -> Option<ObsStreamData> {
        self.load().and_then(|c| c.stream)
    }
}

/// In-memory configuration that can be swapped at runtime
#[derive(Default)]
pub struct StaticConfigSource {
    config: Mutex<AppConfig>,
}

impl StaticConfigSource {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub fn set_endpoint(&self, endpoint: Option<EndpointConfig>) {
        self.config.lock().endpoint = endpoint;
    }

    pub fn set_stream(&self, stream: Option<ObsStreamData>) {
        self.config.lock().stream = stream;
    }
}

impl ConfigSource for StaticConfigSource {
    fn endpoint_config(&self) -> Option<EndpointConfig> {
        self.config.lock().endpoint.clone()
    }

    fn stream_data(&self) -> Option<ObsStreamData> {
        self.config.lock().stream.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[endpoint]
type = "obs"
url = "192.168.1.10"
password = "secret"

[stream]
protocol = "rtp_mpegts"
host = "udp://192.168.1.10:9000"

[stream.video]
codec = "vp8"
pix_fmt = "yuv420p"
bitrate = 1000000
framerate = 24
resolution = "640x480"

[camera]
device_id = "1"
preview_window = "1080x2400"
"#;

    #[test]
    fn parses_full_config() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();

        let Some(EndpointConfig::Obs(obs)) = &config.endpoint else {
            panic!("missing endpoint");
        };
        assert_eq!(obs.port, DEFAULT_OBS_PORT);
        assert_eq!(obs.password, "secret");
        assert_eq!(obs.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);

        let stream = config.stream.as_ref().unwrap();
        assert_eq!(stream.protocol, StreamProtocol::RtpMpegts);
        assert_eq!(stream.video.codec, Some(VideoCodec::Vp8));
        assert_eq!(stream.video.resolution, Some(Resolution::new(640, 480)));
        assert_eq!(config.camera.device_id.as_deref(), Some("1"));
        assert_eq!(config.camera.preview_window, Some(Resolution::new(1080, 2400)));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("camrelay-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.stream.as_mut().unwrap().audio = Some(AudioConfig::default());
        config.save(&path).unwrap();

        let source = FileConfigSource::new(&path);
        assert_eq!(source.stream_data(), config.stream);
        assert_eq!(source.endpoint_config(), config.endpoint);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_file_has_no_endpoint() {
        let source = FileConfigSource::new("/nonexistent/camrelay/config.toml");
        assert!(source.endpoint_config().is_none());
        assert!(source.stream_data().is_none());
    }
}
