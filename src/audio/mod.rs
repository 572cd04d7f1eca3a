//! Audio capture and analysis module

mod capture;
mod fft;
mod mapper;
mod sources;

pub use capture::{AudioCaptureHandle, CaptureError, CaptureFormat, FrameSink};
pub use fft::{Peak, SpectralAnalyzer, Spectrum};
pub use mapper::{freq_transform, strength_transform, FREQ_MAX, FREQ_MIN, FREQ_OFFSET};
pub use sources::{list_sources, AudioSource, SourceError, SourceType, SYSTEM_AUDIO_ID};

use serde::Deserialize;
use std::time::Instant;

/// Upper edge of the analysed band in Hz
pub const DEFAULT_BAND_LIMIT_HZ: u32 = 1100;

/// How the capture thread hands buffers to the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backpressure {
    /// Block the capture callback until the peripheral write completes.
    /// Commands leave in capture order; a slow link stalls capture.
    #[default]
    Block,

    /// Keep only the newest undispatched buffer in a single-slot mailbox
    /// drained by a worker thread. Capture never stalls; stale buffers are dropped.
    DropOldest,
}

/// Audio processing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture source ID (see [`list_sources`]); `None` = default output loopback
    pub source_id: Option<String>,

    /// Spectrum bins above this frequency are discarded
    pub band_limit_hz: u32,

    /// Capture-to-dispatch handoff policy
    pub backpressure: Backpressure,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source_id: None,
            band_limit_hz: DEFAULT_BAND_LIMIT_HZ,
            backpressure: Backpressure::Block,
        }
    }
}

/// One captured buffer of interleaved f32 PCM
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved samples (`L R L R ...` for stereo)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channel_count: u16,

    /// When the capture callback delivered this buffer
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channel_count,
            captured_at: Instant::now(),
        }
    }

    /// Number of whole frames (one sample per channel) in the buffer
    pub fn frames(&self) -> usize {
        match self.channel_count {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    /// Deinterleave one channel by stride. A trailing partial frame is dropped.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let stride = self.channel_count as usize;
        if index >= stride {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index)
            .step_by(stride)
            .take(self.frames())
            .copied()
            .collect()
    }
}
