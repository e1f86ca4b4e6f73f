//! Null transcoding engine that records what it is asked to do

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::camera::request::VideoFrame;
use crate::error::EngineError;
use crate::model::{AudioConfig, PixFmt, Resolution, StreamProtocol, VideoCodec, VideoEncodeParams};
use crate::stream::engine::{
    AudioStreamHandle, EngineOutput, EngineResult, TranscodeEngine, VideoStreamHandle,
};

/// Engine call points that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateOutput,
    Open,
    Close,
    VideoStream,
    AudioStream,
}

/// Something the engine was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    OutputCreated { host: String },
    OutputOpened { host: String },
    OutputClosed { host: String },
    OutputDestroyed { host: String },
    VideoCreated { stream: usize },
    VideoStarted { stream: usize },
    VideoStopped { stream: usize },
    VideoResized { stream: usize, resolution: Resolution },
    VideoDestroyed { stream: usize },
    AudioCreated { stream: usize },
    AudioStarted { stream: usize },
    AudioStopped { stream: usize },
    AudioDestroyed { stream: usize },
    /// Inserted by callers to order their own observations among engine events
    Marker(String),
}

#[derive(Default)]
struct LogInner {
    events: Vec<EngineEvent>,
    video_frames: HashMap<usize, u64>,
    audio_blocks: HashMap<usize, u64>,
    next_stream: usize,
}

/// Shared, ordered record of engine activity
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<LogInner>>,
}

impl EventLog {
    pub fn record(&self, event: EngineEvent) {
        trace!(?event, "engine");
        self.inner.lock().events.push(event);
    }

    pub fn marker(&self, label: impl Into<String>) {
        self.record(EngineEvent::Marker(label.into()));
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.inner.lock().events.clone()
    }

    /// Position of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&EngineEvent) -> bool) -> Option<usize> {
        self.inner.lock().events.iter().position(pred)
    }

    pub fn count(&self, pred: impl Fn(&EngineEvent) -> bool) -> usize {
        self.inner.lock().events.iter().filter(|e| pred(e)).count()
    }

    pub fn video_frames(&self, stream: usize) -> u64 {
        self.inner.lock().video_frames.get(&stream).copied().unwrap_or(0)
    }

    pub fn total_video_frames(&self) -> u64 {
        self.inner.lock().video_frames.values().sum()
    }

    pub fn total_audio_blocks(&self) -> u64 {
        self.inner.lock().audio_blocks.values().sum()
    }

    fn next_stream(&self) -> usize {
        let mut inner = self.inner.lock();
        let id = inner.next_stream;
        inner.next_stream += 1;
        id
    }

    fn count_frame(&self, stream: usize) {
        *self.inner.lock().video_frames.entry(stream).or_default() += 1;
    }

    fn count_block(&self, stream: usize) {
        *self.inner.lock().audio_blocks.entry(stream).or_default() += 1;
    }
}

type Failures = Arc<Mutex<HashMap<FailPoint, i32>>>;

fn check(failures: &Failures, point: FailPoint) -> EngineResult<()> {
    match failures.lock().get(&point) {
        Some(&code) => EngineError::check(code),
        None => Ok(()),
    }
}

/// Accepts everything and encodes nothing
#[derive(Clone, Default)]
pub struct SimEngine {
    log: EventLog,
    failures: Failures,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Make `point` fail with the raw engine status `code` until cleared
    pub fn fail(&self, point: FailPoint, code: i32) {
        self.failures.lock().insert(point, code);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }
}

impl TranscodeEngine for SimEngine {
    fn create_output(&self, _protocol: StreamProtocol, host: &str) -> EngineResult<Box<dyn EngineOutput>> {
        check(&self.failures, FailPoint::CreateOutput)?;
        self.log.record(EngineEvent::OutputCreated { host: host.to_string() });
        Ok(Box::new(SimOutput {
            host: host.to_string(),
            log: self.log.clone(),
            failures: self.failures.clone(),
        }))
    }

    fn supported_codecs(&self) -> Vec<VideoCodec> {
        vec![VideoCodec::H264, VideoCodec::Vp8, VideoCodec::Mjpeg]
    }

    fn supported_formats(&self, codec: VideoCodec) -> Vec<PixFmt> {
        match codec {
            VideoCodec::Mjpeg => vec![PixFmt::Yuv420p, PixFmt::Yuv444p],
            _ => vec![PixFmt::Yuv420p, PixFmt::Nv12, PixFmt::Nv21],
        }
    }
}

struct SimOutput {
    host: String,
    log: EventLog,
    failures: Failures,
}

impl EngineOutput for SimOutput {
    fn open(&mut self) -> EngineResult<()> {
        check(&self.failures, FailPoint::Open)?;
        self.log.record(EngineEvent::OutputOpened { host: self.host.clone() });
        Ok(())
    }

    fn close(&mut self) -> EngineResult<()> {
        check(&self.failures, FailPoint::Close)?;
        self.log.record(EngineEvent::OutputClosed { host: self.host.clone() });
        Ok(())
    }

    fn make_video_stream(&mut self, params: &VideoEncodeParams) -> EngineResult<Box<dyn VideoStreamHandle>> {
        check(&self.failures, FailPoint::VideoStream)?;
        let stream = self.log.next_stream();
        self.log.record(EngineEvent::VideoCreated { stream });
        Ok(Box::new(SimVideoStream {
            stream,
            resolution: params.resolution,
            log: self.log.clone(),
        }))
    }

    fn make_audio_stream(&mut self, _config: &AudioConfig) -> EngineResult<Box<dyn AudioStreamHandle>> {
        check(&self.failures, FailPoint::AudioStream)?;
        let stream = self.log.next_stream();
        self.log.record(EngineEvent::AudioCreated { stream });
        Ok(Box::new(SimAudioStream {
            stream,
            log: self.log.clone(),
        }))
    }

    fn destroy(&mut self) {
        self.log.record(EngineEvent::OutputDestroyed { host: self.host.clone() });
    }
}

struct SimVideoStream {
    stream: usize,
    resolution: Resolution,
    log: EventLog,
}

impl VideoStreamHandle for SimVideoStream {
    fn send(&mut self, frame: &VideoFrame) -> EngineResult<()> {
        if frame.planes.len() != frame.format.plane_count() {
            return Err(EngineError::VideoInvalidPlaneCount);
        }
        self.log.count_frame(self.stream);
        Ok(())
    }

    fn set_resolution(&mut self, resolution: Resolution) -> EngineResult<()> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(EngineError::VideoInvalidResolution);
        }
        self.resolution = resolution;
        self.log.record(EngineEvent::VideoResized {
            stream: self.stream,
            resolution,
        });
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        self.log.record(EngineEvent::VideoStarted { stream: self.stream });
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.log.record(EngineEvent::VideoStopped { stream: self.stream });
        Ok(())
    }

    fn destroy(&mut self) {
        self.log.record(EngineEvent::VideoDestroyed { stream: self.stream });
    }
}

struct SimAudioStream {
    stream: usize,
    log: EventLog,
}

impl AudioStreamHandle for SimAudioStream {
    fn send(&mut self, _timestamp_ns: u64, samples: &[u8]) -> EngineResult<()> {
        if samples.is_empty() {
            return Err(EngineError::InvalidArgument);
        }
        self.log.count_block(self.stream);
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        self.log.record(EngineEvent::AudioStarted { stream: self.stream });
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.log.record(EngineEvent::AudioStopped { stream: self.stream });
        Ok(())
    }

    fn destroy(&mut self) {
        self.log.record(EngineEvent::AudioDestroyed { stream: self.stream });
    }
}
