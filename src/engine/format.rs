//! Backend buffer formats
//!
//! The backend only accepts four sample layouts. Everything else is rejected
//! when an [`AudioAsset`](crate::engine::AudioAsset) is built, long before a
//! device is opened.

use std::fmt;

use crate::error::{HaasError, Result};

/// Sample layout understood by the playback backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    /// 1 channel, unsigned 8-bit
    Mono8,
    /// 2 channels, unsigned 8-bit, interleaved
    Stereo8,
    /// 1 channel, signed 16-bit little-endian
    Mono16,
    /// 2 channels, signed 16-bit little-endian, interleaved
    Stereo16,
}

impl BufferFormat {
    /// All supported formats
    pub const ALL: [BufferFormat; 4] = [
        BufferFormat::Mono8,
        BufferFormat::Stereo8,
        BufferFormat::Mono16,
        BufferFormat::Stereo16,
    ];

    /// Resolve a (channels, bits per sample) pair to a backend format
    ///
    /// # Errors
    /// * `UnsupportedFormat` - For any pair outside mono/stereo x 8/16-bit
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Result<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Ok(BufferFormat::Mono8),
            (2, 8) => Ok(BufferFormat::Stereo8),
            (1, 16) => Ok(BufferFormat::Mono16),
            (2, 16) => Ok(BufferFormat::Stereo16),
            _ => Err(HaasError::UnsupportedFormat {
                channels,
                bits_per_sample,
                float: false,
            }),
        }
    }

    /// OpenAL-compatible format constant
    pub fn tag(self) -> u32 {
        match self {
            BufferFormat::Mono8 => 0x1100,
            BufferFormat::Mono16 => 0x1101,
            BufferFormat::Stereo8 => 0x1102,
            BufferFormat::Stereo16 => 0x1103,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            BufferFormat::Mono8 | BufferFormat::Mono16 => 1,
            BufferFormat::Stereo8 | BufferFormat::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            BufferFormat::Mono8 | BufferFormat::Stereo8 => 8,
            BufferFormat::Mono16 | BufferFormat::Stereo16 => 16,
        }
    }

    /// Bytes occupied by one sample of one channel
    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// Bytes occupied by one frame (one sample for every channel)
    pub fn bytes_per_frame(self) -> usize {
        self.bytes_per_sample() * self.channels() as usize
    }

    /// Decode the sample at `index` (interleaved order) to a float in [-1, 1)
    ///
    /// Out-of-range indices decode as silence.
    pub fn sample_to_f32(self, bytes: &[u8], index: usize) -> f32 {
        match self.bits_per_sample() {
            8 => bytes
                .get(index)
                .map(|&b| (b as f32 - 128.0) / 128.0)
                .unwrap_or(0.0),
            _ => {
                let offset = index * 2;
                match bytes.get(offset..offset + 2) {
                    Some(pair) => i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0,
                    None => 0.0,
                }
            }
        }
    }
}

impl fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferFormat::Mono8 => write!(f, "mono-8"),
            BufferFormat::Stereo8 => write!(f, "stereo-8"),
            BufferFormat::Mono16 => write!(f, "mono-16"),
            BufferFormat::Stereo16 => write!(f, "stereo-16"),
        }
    }
}
