//! Audio frame geometry.
//!
//! The wire protocol carries no length prefix: both peers agree on the frame
//! size out of band. [`FrameSpec`] is that agreement, derived from sample
//! rate, frame duration and sample format.

use std::fmt;

use crate::error::ConfigError;

/// Sampling rates accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    /// 8 kHz
    Sr8000Hz,
    /// 16 kHz
    Sr16000Hz,
    /// 24 kHz
    Sr24000Hz,
    /// 32 kHz
    Sr32000Hz,
    /// 44.1 kHz
    Sr44100Hz,
    /// 48 kHz
    Sr48000Hz,
    /// 88.2 kHz
    Sr88200Hz,
    /// 96 kHz
    Sr96000Hz,
}

impl SampleRate {
    /// Parse a rate in hertz.
    pub fn from_hz(hz: u32) -> Result<Self, ConfigError> {
        match hz {
            8000 => Ok(Self::Sr8000Hz),
            16000 => Ok(Self::Sr16000Hz),
            24000 => Ok(Self::Sr24000Hz),
            32000 => Ok(Self::Sr32000Hz),
            44100 => Ok(Self::Sr44100Hz),
            48000 => Ok(Self::Sr48000Hz),
            88200 => Ok(Self::Sr88200Hz),
            96000 => Ok(Self::Sr96000Hz),
            other => Err(ConfigError::UnsupportedSampleRate(other)),
        }
    }

    /// Rate in hertz.
    pub fn hz(self) -> u32 {
        match self {
            Self::Sr8000Hz => 8000,
            Self::Sr16000Hz => 16000,
            Self::Sr24000Hz => 24000,
            Self::Sr32000Hz => 32000,
            Self::Sr44100Hz => 44100,
            Self::Sr48000Hz => 48000,
            Self::Sr88200Hz => 88200,
            Self::Sr96000Hz => 96000,
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Duration of one processing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDuration {
    /// 10 ms
    Fd10ms,
    /// 20 ms
    Fd20ms,
}

impl FrameDuration {
    /// Parse a duration in milliseconds.
    pub fn from_millis(ms: u32) -> Result<Self, ConfigError> {
        match ms {
            10 => Ok(Self::Fd10ms),
            20 => Ok(Self::Fd20ms),
            other => Err(ConfigError::UnsupportedFrameDuration(other)),
        }
    }

    /// Duration in milliseconds.
    pub fn millis(self) -> u32 {
        match self {
            Self::Fd10ms => 10,
            Self::Fd20ms => 20,
        }
    }
}

/// Encoding of a single sample on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM
    #[default]
    Pcm16,
    /// 32-bit little-endian IEEE float
    Float32,
}

impl SampleFormat {
    /// Bytes per sample.
    pub fn width(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// Fixed frame geometry shared implicitly by both peers.
///
/// The default is 16 kHz, 20 ms, PCM16: 320 samples, 640 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSpec {
    /// Sample rate of the stream
    pub sample_rate: SampleRate,
    /// Duration of one frame
    pub frame_duration: FrameDuration,
    /// Sample encoding
    pub sample_format: SampleFormat,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Sr16000Hz,
            frame_duration: FrameDuration::Fd20ms,
            sample_format: SampleFormat::Pcm16,
        }
    }
}

impl FrameSpec {
    /// Build a frame spec.
    pub fn new(
        sample_rate: SampleRate,
        frame_duration: FrameDuration,
        sample_format: SampleFormat,
    ) -> Self {
        Self { sample_rate, frame_duration, sample_format }
    }

    /// Samples in one frame.
    pub fn samples_per_frame(&self) -> usize {
        self.sample_rate.hz() as usize * self.frame_duration.millis() as usize / 1000
    }

    /// Bytes in one frame.
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.sample_format.width()
    }

    /// Bytes per sample.
    pub fn sample_width(&self) -> usize {
        self.sample_format.width()
    }
}

impl fmt::Display for FrameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} ms / {:?} ({} bytes per frame)",
            self.sample_rate,
            self.frame_duration.millis(),
            self.sample_format,
            self.frame_bytes()
        )
    }
}
