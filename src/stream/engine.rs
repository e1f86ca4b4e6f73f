//! Native transcoding engine boundary
//!
//! The engine is consumed only through these traits. Implementations report
//! failures with [`EngineError`]; anything returning a raw status code goes
//! through [`EngineError::check`] first.

use crate::camera::request::VideoFrame;
use crate::error::EngineError;
use crate::model::{AudioConfig, PixFmt, Resolution, StreamProtocol, VideoCodec, VideoEncodeParams};

pub type EngineResult<T> = Result<T, EngineError>;

/// Factory for outputs plus capability queries
pub trait TranscodeEngine: Send + Sync {
    /// Create an unopened output muxing `protocol` to `host`
    fn create_output(&self, protocol: StreamProtocol, host: &str) -> EngineResult<Box<dyn EngineOutput>>;

    fn supported_codecs(&self) -> Vec<VideoCodec>;

    fn supported_formats(&self, codec: VideoCodec) -> Vec<PixFmt>;
}

/// One muxed network output
pub trait EngineOutput: Send {
    fn open(&mut self) -> EngineResult<()>;

    fn close(&mut self) -> EngineResult<()>;

    fn make_video_stream(&mut self, params: &VideoEncodeParams) -> EngineResult<Box<dyn VideoStreamHandle>>;

    fn make_audio_stream(&mut self, config: &AudioConfig) -> EngineResult<Box<dyn AudioStreamHandle>>;

    /// Release native resources; the output is unusable afterwards
    fn destroy(&mut self);
}

/// Encoder input for one video stream
pub trait VideoStreamHandle: Send {
    fn send(&mut self, frame: &VideoFrame) -> EngineResult<()>;

    fn set_resolution(&mut self, resolution: Resolution) -> EngineResult<()>;

    fn start(&mut self) -> EngineResult<()>;

    fn stop(&mut self) -> EngineResult<()>;

    fn destroy(&mut self);
}

/// Encoder input for one audio stream
pub trait AudioStreamHandle: Send {
    /// Interleaved PCM in the stream's configured sample format
    fn send(&mut self, timestamp_ns: u64, samples: &[u8]) -> EngineResult<()>;

    fn start(&mut self) -> EngineResult<()>;

    fn stop(&mut self) -> EngineResult<()>;

    fn destroy(&mut self);
}
