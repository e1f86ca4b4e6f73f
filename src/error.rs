//! Error types for the capture, streaming and endpoint subsystems
//!
//! Every boundary crossed by the core carries one of the closed taxonomies
//! below. Transport and engine failures are classified where they happen and
//! never escape as library-specific errors.

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

/// Capture pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Binding failed: {0}")]
    BindFailed(String),

    #[error("No capture device available")]
    NoDevice,
}

/// Status codes reported by the native transcoding engine
///
/// The numeric values are part of the engine ABI and must stay in sync with it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineError {
    // General
    #[error("Unknown engine error")]
    Unknown,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Invalid state")]
    InvalidState,

    // Encoder / muxer
    #[error("Allocation failed")]
    AllocFailed,
    #[error("Codec not found")]
    CodecNotFound,
    #[error("Failed to open codec")]
    CodecOpenFailed,
    #[error("Failed to create stream")]
    StreamCreationFailed,
    #[error("Failed to set stream parameters")]
    StreamParametersFailed,
    #[error("Write failed")]
    WriteFailed,

    // Video frames
    #[error("Invalid video format")]
    VideoInvalidFormat,
    #[error("Invalid video resolution")]
    VideoInvalidResolution,
    #[error("Invalid pixel format")]
    VideoInvalidPixelFormat,
    #[error("Invalid plane count")]
    VideoInvalidPlaneCount,
    #[error("Invalid stride")]
    VideoInvalidStride,
}

impl EngineError {
    const ALL: [EngineError; 14] = [
        EngineError::Unknown,
        EngineError::InvalidArgument,
        EngineError::InvalidState,
        EngineError::AllocFailed,
        EngineError::CodecNotFound,
        EngineError::CodecOpenFailed,
        EngineError::StreamCreationFailed,
        EngineError::StreamParametersFailed,
        EngineError::WriteFailed,
        EngineError::VideoInvalidFormat,
        EngineError::VideoInvalidResolution,
        EngineError::VideoInvalidPixelFormat,
        EngineError::VideoInvalidPlaneCount,
        EngineError::VideoInvalidStride,
    ];

    /// Wire code of this error
    pub fn code(self) -> i32 {
        match self {
            EngineError::Unknown => -1,
            EngineError::InvalidArgument => -2,
            EngineError::InvalidState => -3,
            EngineError::AllocFailed => -100,
            EngineError::CodecNotFound => -101,
            EngineError::CodecOpenFailed => -102,
            EngineError::StreamCreationFailed => -103,
            EngineError::StreamParametersFailed => -104,
            EngineError::WriteFailed => -105,
            EngineError::VideoInvalidFormat => -200,
            EngineError::VideoInvalidResolution => -201,
            EngineError::VideoInvalidPixelFormat => -202,
            EngineError::VideoInvalidPlaneCount => -203,
            EngineError::VideoInvalidStride => -204,
        }
    }

    /// Parse a wire code, `None` for codes outside the closed set
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    /// Interpret a raw engine return value (`0` is success)
    pub fn check(code: i32) -> std::result::Result<(), EngineError> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::from_code(code).unwrap_or(EngineError::Unknown))
        }
    }
}

/// Stream session errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("No destination host configured")]
    NoHost,

    #[error("No usable stream configured")]
    NoVideoConfig,

    #[error("Session is already started")]
    AlreadyStarted,

    #[error("Transcoder error: {0}")]
    Ffmpeg(#[from] EngineError),
}

/// Authentication failure reported by the remote-control server
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("password required")]
    PasswordRequired,

    #[error("invalid password")]
    InvalidPassword,

    #[error("unsupported protocol version")]
    UnsupportedVersion,
}

/// Remote-control (OBS) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObsError {
    #[error("Authentication failed: {0}")]
    AuthFailed(AuthFailure),

    #[error("Remote does not support input kind '{0}'")]
    UnknownInput(String),

    #[error("Request failed ({code}): {comment}")]
    RequestFailed { code: u16, comment: String },

    #[error("Unknown host")]
    UnknownHost,

    #[error("Connection timed out")]
    ConnectionTimeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("No stream data configured")]
    NotHaveData,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Endpoint-level errors surfaced to the UI layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Endpoint is not configured")]
    EndpointNotConfigured,

    #[error("{0}")]
    Obs(ObsError),

    #[error("{0}")]
    Stream(#[from] StreamError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<ObsError> for EndpointError {
    fn from(err: ObsError) -> Self {
        match err {
            ObsError::Unknown(msg) => EndpointError::Unknown(msg),
            other => EndpointError::Obs(other),
        }
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_codes_are_closed() {
        for err in EngineError::ALL {
            assert_eq!(EngineError::from_code(err.code()), Some(err));
        }
        assert_eq!(EngineError::from_code(-7), None);
        assert_eq!(EngineError::from_code(0), None);
    }

    #[test]
    fn engine_check_maps_unknown_codes() {
        assert_eq!(EngineError::check(0), Ok(()));
        assert_eq!(EngineError::check(-101), Err(EngineError::CodecNotFound));
        assert_eq!(EngineError::check(-9999), Err(EngineError::Unknown));
    }

    #[test]
    fn unknown_obs_error_becomes_unknown_endpoint_error() {
        let err: EndpointError = ObsError::Unknown("boom".into()).into();
        assert_eq!(err, EndpointError::Unknown("boom".into()));

        let err: EndpointError = ObsError::ConnectionRefused.into();
        assert_eq!(err, EndpointError::Obs(ObsError::ConnectionRefused));
    }
}
