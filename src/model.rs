//! Value types shared by the capture, stream and endpoint layers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width divided by height, `None` for a zero height
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.height == 0 {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }

    /// Reduce to lowest terms, e.g. 1920x1080 -> 16x9
    pub fn simplified(&self) -> Resolution {
        let gcd = gcd(self.width, self.height);
        if gcd == 0 {
            return *self;
        }
        Resolution::new(self.width / gcd, self.height / gcd)
    }

    /// Longer side
    pub fn long_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Shorter side
    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// True if this size fits inside `bounds` regardless of orientation
    pub fn fits_within(&self, bounds: &Resolution) -> bool {
        self.long_side() <= bounds.long_side() && self.short_side() <= bounds.short_side()
    }
}

fn gcd(mut p: u32, mut q: u32) -> u32 {
    while q != 0 {
        let r = p % q;
        p = q;
        q = r;
    }
    p
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
        Ok(Resolution::new(width, height))
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Framerate range in frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Framerate {
    min: u32,
    max: u32,
}

impl Framerate {
    /// Create a range, `None` if `min > max`
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    /// A fixed rate (min == max)
    pub const fn fixed(fps: u32) -> Self {
        Self { min: fps, max: fps }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, fps: u32) -> bool {
        self.min <= fps && fps <= self.max
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for Framerate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid framerate '{}'", v))
        };

        match s.split_once('-') {
            Some((min, max)) => Framerate::new(parse(min)?, parse(max)?)
                .ok_or_else(|| format!("minimum exceeds maximum in '{}'", s)),
            None => Ok(Framerate::fixed(parse(s)?)),
        }
    }
}

impl TryFrom<String> for Framerate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Framerate> for String {
    fn from(value: Framerate) -> Self {
        value.to_string()
    }
}

/// Container / transport protocol of the outgoing stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamProtocol {
    #[default]
    Mpegts,
    Mjpeg,
    Smjpeg,
    Rtsp,
    Rtp,
    RtpMpegts,
    Hls,
}

impl StreamProtocol {
    /// Muxer name understood by the transcoding engine
    pub fn muxer_name(&self) -> &'static str {
        match self {
            StreamProtocol::Mpegts => "mpegts",
            StreamProtocol::Mjpeg => "mjpeg",
            StreamProtocol::Smjpeg => "smjpeg",
            StreamProtocol::Rtsp => "rtsp",
            StreamProtocol::Rtp => "rtp",
            StreamProtocol::RtpMpegts => "rtp_mpegts",
            StreamProtocol::Hls => "hls",
        }
    }
}

/// Video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Hevc,
    Mjpeg,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 7] = [
        VideoCodec::H264,
        VideoCodec::Vp8,
        VideoCodec::Vp9,
        VideoCodec::Av1,
        VideoCodec::Mpeg4,
        VideoCodec::Hevc,
        VideoCodec::Mjpeg,
    ];
}

/// Pixel formats of encoder input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixFmt {
    #[default]
    Yuv420p,
    Yuv444p,
    Nv12,
    Nv21,
    Rgba,
    Rgb24,
}

impl PixFmt {
    /// Number of planes a frame of this format carries
    pub fn plane_count(&self) -> usize {
        match self {
            PixFmt::Yuv420p | PixFmt::Yuv444p => 3,
            PixFmt::Nv12 | PixFmt::Nv21 => 2,
            PixFmt::Rgba | PixFmt::Rgb24 => 1,
        }
    }
}

/// PCM sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    PcmS16le,
    PcmS32le,
    #[default]
    PcmF32le,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::PcmS16le => 2,
            SampleFormat::PcmS32le | SampleFormat::PcmF32le => 4,
        }
    }
}

/// User-facing video encoder settings; any field may still be unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct VideoConfig {
    pub codec: Option<VideoCodec>,
    pub pix_fmt: Option<PixFmt>,
    pub bitrate: Option<u32>,
    pub framerate: Option<u32>,
    pub resolution: Option<Resolution>,
}

impl VideoConfig {
    /// Fully-specified encoder parameters, `None` if any field is unset
    pub fn encode_params(&self) -> Option<VideoEncodeParams> {
        Some(VideoEncodeParams {
            codec: self.codec?,
            pix_fmt: self.pix_fmt?,
            bitrate: self.bitrate?,
            framerate: self.framerate?,
            resolution: self.resolution?,
        })
    }
}

/// Static encoder parameters of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoEncodeParams {
    pub codec: VideoCodec,
    pub pix_fmt: PixFmt,
    pub bitrate: u32,
    pub framerate: u32,
    pub resolution: Resolution,
}

/// Audio encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
    pub format: SampleFormat,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::constants::DEFAULT_SAMPLE_RATE,
            channels: 1,
            bitrate: 128_000,
            format: SampleFormat::PcmF32le,
        }
    }
}
