use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::model::AudioConfig;
use crate::stream::target::{AudioBlock, AudioSource};

/// Sine tone in f32 little-endian PCM, paced in real time
pub struct ToneSource {
    config: AudioConfig,
    frequency: f32,
    block_frames: usize,
    running: AtomicBool,
    clock: Mutex<ToneClock>,
}

struct ToneClock {
    started: Instant,
    frames: u64,
}

impl ToneSource {
    pub fn new(config: AudioConfig, frequency: f32) -> Self {
        Self {
            config,
            frequency,
            // 20 ms blocks
            block_frames: (config.sample_rate / 50).max(1) as usize,
            running: AtomicBool::new(false),
            clock: Mutex::new(ToneClock {
                started: Instant::now(),
                frames: 0,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl AudioSource for ToneSource {
    fn start(&self) -> Result<(), CaptureError> {
        let mut clock = self.clock.lock();
        clock.started = Instant::now();
        clock.frames = 0;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn read(&self) -> Option<AudioBlock> {
        if !self.is_running() {
            return None;
        }

        let rate = self.config.sample_rate.max(1) as u64;
        let (first, due) = {
            let mut clock = self.clock.lock();
            let first = clock.frames;
            clock.frames += self.block_frames as u64;
            let due = clock.started + Duration::from_nanos(clock.frames * 1_000_000_000 / rate);
            (first, due)
        };

        let channels = self.config.channels.max(1) as usize;
        let mut data = BytesMut::with_capacity(self.block_frames * channels * 4);
        for n in 0..self.block_frames as u64 {
            let t = (first + n) as f32 / rate as f32;
            let sample = (t * self.frequency * std::f32::consts::TAU).sin() * 0.25;
            for _ in 0..channels {
                data.put_f32_le(sample);
            }
        }

        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }

        Some(AudioBlock {
            timestamp_ns: first * 1_000_000_000 / rate,
            data: data.freeze(),
        })
    }
}
