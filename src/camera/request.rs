//! Capture requests and the frame queue that carries their output
//!
//! A `CaptureRequest` is one consumer's demand for frames. The provider pushes
//! frames into the request's bounded queue; the consumer drains it. When the
//! consumer falls behind, the oldest frame is dropped so latency stays bounded.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::constants::FRAME_QUEUE_CAPACITY;
use crate::model::{Framerate, PixFmt, Resolution};

/// One plane of a video frame
#[derive(Debug, Clone)]
pub struct FramePlane {
    pub data: Bytes,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// A captured video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Capture timestamp in nanoseconds
    pub timestamp_ns: u64,
    pub resolution: Resolution,
    pub format: PixFmt,
    pub planes: Vec<FramePlane>,
}

impl VideoFrame {
    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Bounded frame queue; pushing into a full queue evicts the oldest frame
pub struct FrameQueue {
    queue: ArrayQueue<VideoFrame>,
    notify: Notify,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame, evicting the oldest one if full
    pub fn push(&self, frame: VideoFrame) {
        if self.queue.force_push(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<VideoFrame> {
        self.queue.pop()
    }

    /// Wait for the next frame
    ///
    /// Intended for a single consumer.
    pub async fn recv(&self) -> VideoFrame {
        loop {
            if let Some(frame) = self.queue.pop() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    /// Discard every queued frame
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Frames pushed so far
    pub fn pushed_count(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames evicted before being consumed
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Stream parameters a request asks the provider for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestSpec {
    /// Require this exact resolution; provider default otherwise
    pub resolution: Option<Resolution>,
    pub framerate: Option<Framerate>,
}

/// One consumer's demand for frames
pub struct CaptureRequest {
    id: Uuid,
    label: &'static str,
    spec: RequestSpec,
    frames: FrameQueue,
}

impl CaptureRequest {
    pub fn new(label: &'static str, spec: RequestSpec) -> Self {
        Self::with_capacity(label, spec, FRAME_QUEUE_CAPACITY)
    }

    pub fn with_capacity(label: &'static str, spec: RequestSpec, capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            spec,
            frames: FrameQueue::new(capacity),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the consumer that created this request
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    pub fn frames(&self) -> &FrameQueue {
        &self.frames
    }
}

impl std::fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("spec", &self.spec)
            .field("queued", &self.frames.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_frame(timestamp_ns: u64) -> VideoFrame {
    VideoFrame {
        timestamp_ns,
        resolution: Resolution::new(4, 2),
        format: PixFmt::Rgba,
        planes: vec![FramePlane {
            data: Bytes::from(vec![0u8; 32]),
            row_stride: 16,
            pixel_stride: 4,
        }],
    }
}
