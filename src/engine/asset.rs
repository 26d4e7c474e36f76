//! Decoded audio descriptor
//!
//! An [`AudioAsset`] is the immutable result of decoding a PCM file: the
//! resolved backend format, the sample rate and the raw interleaved sample
//! bytes, exactly as they will be uploaded.

use std::time::Duration;

use crate::engine::format::BufferFormat;
use crate::error::{HaasError, Result};

/// Immutable decoded audio, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    format: BufferFormat,
    sample_rate: u32,
    samples: Vec<u8>,
}

impl AudioAsset {
    /// Build an asset from raw PCM bytes
    ///
    /// 8-bit samples are unsigned, 16-bit samples are signed little-endian,
    /// both interleaved by channel.
    ///
    /// # Errors
    /// * `UnsupportedFormat` - If (channels, bits) has no backend format
    /// * `InvalidAsset` - If the sample rate is zero or the byte count is not
    ///   a whole number of frames
    pub fn new(
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        samples: Vec<u8>,
    ) -> Result<Self> {
        let format = BufferFormat::from_layout(channels, bits_per_sample)?;
        Self::with_format(format, sample_rate, samples)
    }

    /// Build an asset for an already-resolved format
    pub fn with_format(format: BufferFormat, sample_rate: u32, samples: Vec<u8>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(HaasError::InvalidAsset {
                reason: "sample rate must be positive".to_string(),
            });
        }

        if samples.len() % format.bytes_per_frame() != 0 {
            return Err(HaasError::InvalidAsset {
                reason: format!(
                    "{} bytes is not a whole number of {} frames",
                    samples.len(),
                    format
                ),
            });
        }

        Ok(AudioAsset {
            format,
            sample_rate,
            samples,
        })
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channels()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.format.bits_per_sample()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw interleaved sample bytes
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.format.bytes_per_frame()
    }

    /// Nominal playback length: `frame_count / sample_rate`
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
