//! # camrelay
//!
//! Runtime core of a phone-as-camera streamer: arbitrates the capture device
//! between competing consumers, turns a declarative session configuration into
//! running encode/relay tasks, and keeps a remote production tool (OBS) and the
//! media session in one connect/disconnect lifecycle.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         EndpointHandler (endpoint)                          │
//! │        connect() / disconnect() / check_connection() / latest config        │
//! │  ┌──────────────────────────────┐      ┌──────────────────────────────┐     │
//! │  │  ConnectionHandler (obs)     │      │  StreamHandler (obs)         │     │
//! │  │  handshake, scene, input     │      │  SessionManager::get_or_build│     │
//! │  └──────────────┬───────────────┘      └──────────────┬───────────────┘     │
//! │                 │  combine_state()                    │                     │
//! └─────────────────┼─────────────────────────────────────┼─────────────────────┘
//!                   │ remote-control protocol             ▼
//!                   ▼                       ┌─────────────────────────────────┐
//!            ┌─────────────┐                │  SessionRunner (stream)         │
//!            │  OBS Studio │◄── media ──────│  StreamOutput + per-stream task │
//!            └─────────────┘                └───────┬─────────────────┬───────┘
//!                                                   │ VideoRelay      │ AudioRelay
//!                                                   ▼                 ▼
//! ┌─────────────────────────────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CaptureArbiter (camera)             │   │ RecordTarget │   │ AudioSource  │
//! │  [Preview] [Record] [Analyze] slots │◄──│ PreviewTarget│   └──────────────┘
//! │  top-2 by priority bound to device  │   │AnalyzerTarget│
//! └──────────────────┬──────────────────┘   └──────────────┘
//!                    ▼
//!         ┌─────────────────────┐
//!         │ CaptureDevice       │  single dedicated worker thread
//!         │  CaptureProvider    │
//!         └─────────────────────┘
//! ```

pub mod camera;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod model;
#[cfg(feature = "sim")]
pub mod sim;
pub mod state;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use crate::model::Resolution;

    /// Maximum number of capture requests bound to the device at once
    pub const MAX_CONCURRENT_BINDINGS: usize = 2;

    /// Default OBS websocket port
    pub const DEFAULT_OBS_PORT: u16 = 4455;

    /// Default handshake timeout in milliseconds
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Default video bitrate in bits per second
    pub const DEFAULT_VIDEO_BITRATE: u32 = 4_000_000;

    /// Default video framerate
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Default audio sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Frame queue capacity between capture and relay (in frames)
    pub const FRAME_QUEUE_CAPACITY: usize = 4;

    /// Name of the scene created when OBS has no active program scene
    pub const FALLBACK_SCENE_NAME: &str = "MainScene";

    /// Name of the media input created in OBS
    pub const STREAM_INPUT_NAME: &str = "CameraStream";

    /// Full HD, upper bound for preview sizes
    pub const FULL_HD: Resolution = Resolution::new(1920, 1080);

    /// HD, upper bound for the default record size
    pub const HD: Resolution = Resolution::new(1280, 720);
}
