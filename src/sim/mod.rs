//! In-process stand-ins for the capture provider, the transcoding engine and
//! the remote production tool
//!
//! Used by the loopback binary and the integration tests.

mod audio;
mod engine;
mod provider;
mod remote;

pub use audio::ToneSource;
pub use engine::{EngineEvent, EventLog, FailPoint, SimEngine};
pub use provider::{BindRecord, SimProvider};
pub use remote::{CreatedInput, ScriptedRemote};
