//! Core audio data types
//!
//! Defines the decoded-source and bus buffer structures used throughout the
//! pipeline.
//!
//! **Format:**
//! - Samples are f32 (floating point -1.0 to 1.0)
//! - AudioSource is channel-interleaved: [L, R, L, R, ...] for stereo
//! - Buses are mono: one f32 per frame

use crate::error::{Error, Result};

/// Decoded audio source, immutable once produced by the decoder.
#[derive(Debug, Clone)]
pub struct AudioSource {
    /// PCM samples, interleaved by channel
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (2 for stereo)
    pub channels: u16,
}

impl AudioSource {
    /// Create a new AudioSource from decoded PCM data.
    ///
    /// Truncates any trailing partial frame so `samples.len()` is always a
    /// multiple of the channel count.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(Error::Decode("source has zero channels".into()));
        }
        if sample_rate == 0 {
            return Err(Error::Decode("source has zero sample rate".into()));
        }
        let rem = samples.len() % channels as usize;
        if rem != 0 {
            samples.truncate(samples.len() - rem);
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Which of the two output buses a buffer or device belongs to.
///
/// Bus A conventionally carries the left feed, bus B the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusLabel {
    A,
    B,
}

impl BusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusLabel::A => "left",
            BusLabel::B => "right",
        }
    }
}

impl std::fmt::Display for BusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a bus was mixed from, kept for logging and session inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusContent {
    /// One channel of a stereo source (pure partition, no arithmetic)
    Channel(BusLabel),

    /// A summed selection of stems
    Stems(Vec<crate::audio::stems::Stem>),
}

/// One of the two final mono streams routed to one output device.
///
/// Read-only after the sync scheduler emits the final pair; both transports
/// read their bus without coordination.
#[derive(Debug, Clone)]
pub struct Bus {
    pub label: BusLabel,
    pub content: BusContent,

    /// Mono PCM mixdown, one sample per frame
    pub samples: Vec<f32>,

    /// Sample rate in Hz (equal to the source's)
    pub sample_rate: u32,
}

impl Bus {
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_frame_count() {
        let src = AudioSource::new(vec![0.0; 44100 * 2], 44100, 2).unwrap();
        assert_eq!(src.frames(), 44100);
        assert_eq!(src.duration_ms(), 1000);
    }

    #[test]
    fn test_source_truncates_partial_frame() {
        let src = AudioSource::new(vec![0.1, 0.2, 0.3], 44100, 2).unwrap();
        assert_eq!(src.samples.len(), 2);
        assert_eq!(src.frames(), 1);
    }

    #[test]
    fn test_source_rejects_zero_channels() {
        assert!(AudioSource::new(vec![], 44100, 0).is_err());
    }

    #[test]
    fn test_bus_label_names() {
        assert_eq!(BusLabel::A.as_str(), "left");
        assert_eq!(BusLabel::B.as_str(), "right");
    }
}
