//! Per-consumer adapters over the arbiter
//!
//! A target owns the requests it creates, attaches them to its slot on
//! `start`, and publishes a [`CaptureRequestState`] its own consumers follow.

mod analyzer;
mod preview;
mod record;

pub use analyzer::{AnalysisResult, AnalyzerTarget, FrameAnalyzer};
pub use preview::PreviewTarget;
pub use record::RecordTarget;

use crate::state::StateCell;

/// What a target currently offers its consumers
#[derive(Debug, Clone)]
pub enum CaptureRequestState<T> {
    /// Target stopped or never started
    Stopped,
    /// Data ready to be used
    Available(T),
}

impl<T> CaptureRequestState<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, CaptureRequestState::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            CaptureRequestState::Available(value) => Some(value),
            CaptureRequestState::Stopped => None,
        }
    }
}

/// A consumer of the capture device
pub trait CaptureTarget: Send + Sync {
    type Output: Clone + Send + 'static;

    fn request(&self) -> &StateCell<CaptureRequestState<Self::Output>>;

    fn start(&self);

    fn stop(&self);
}
