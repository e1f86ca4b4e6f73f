//! Stream sessions
//!
//! A [`SessionManager`] turns a [`SessionConfig`] into a [`SessionRunner`]
//! that owns one engine output and keeps a task per enabled stream feeding
//! its relay while the runner is in use.

pub mod engine;
pub mod manager;
pub mod output;
pub mod relay;
pub mod runner;
pub mod session;
pub mod target;

pub use engine::{AudioStreamHandle, EngineOutput, TranscodeEngine, VideoStreamHandle};
pub use manager::SessionManager;
pub use output::StreamOutput;
pub use relay::{AudioRelay, RelayStats, VideoRelay};
pub use runner::SessionRunner;
pub use session::{AudioStreamConfig, RelayConfig, SessionConfig, VideoStreamConfig};
pub use target::{
    AudioBlock, AudioCaptureTarget, AudioSource, AudioTarget, AudioTargetState, CameraVideoTarget, VideoTarget,
    VideoTargetState,
};
