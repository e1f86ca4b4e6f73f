//! Capture device arbitration
//!
//! The [`CaptureArbiter`] hands one physical device to up to two of the three
//! consumer slots at a time. Targets in [`target`] wrap each slot for its
//! consumer, and [`device::CaptureDevice`] serializes provider calls onto a
//! dedicated worker thread.

pub mod arbiter;
pub mod device;
pub mod query;
pub mod request;
pub mod target;

pub use arbiter::{select_active, CaptureArbiter, ConsumerSlot};
pub use device::{
    CaptureDevice, CaptureProvider, DeviceCharacteristics, DeviceInfo, DeviceSelector, LensFacing,
};
pub use request::{CaptureRequest, FramePlane, FrameQueue, RequestSpec, VideoFrame};
pub use target::{
    AnalysisResult, AnalyzerTarget, CaptureRequestState, CaptureTarget, FrameAnalyzer, PreviewTarget,
    RecordTarget,
};
