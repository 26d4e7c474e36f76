//! Audio file I/O for Haas
//!
//! Decodes PCM WAV files into an [`AudioAsset`] without converting samples:
//! the bytes handed to the backend are the bytes of the WAV data chunk.
//! Only 8-bit and 16-bit integer PCM in mono or stereo is accepted; 24-bit
//! and float files fail before any sample is read.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::asset::AudioAsset;
use crate::engine::format::BufferFormat;
use crate::error::{HaasError, Result};

/// Load a WAV file into an [`AudioAsset`]
///
/// # Arguments
/// * `path` - Path to the WAV file
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a readable WAV file
/// * `UnsupportedFormat` - For float PCM, or any channel/bit-depth pair
///   other than mono/stereo x 8/16-bit
pub fn load_wav(path: &Path) -> Result<AudioAsset> {
    if !path.exists() {
        return Err(HaasError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| HaasError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let format = resolve_format(&spec)?;

    debug!(
        "Decoding {} ({}, {} Hz, {} samples)",
        path.display(),
        format,
        spec.sample_rate,
        reader.len()
    );

    let samples = read_sample_bytes(reader, format)?;
    AudioAsset::with_format(format, spec.sample_rate, samples)
}

/// Write an asset back out as a PCM WAV file
pub fn export_wav(asset: &AudioAsset, path: &Path) -> Result<()> {
    let format = asset.format();
    let spec = WavSpec {
        channels: format.channels(),
        sample_rate: asset.sample_rate(),
        bits_per_sample: format.bits_per_sample(),
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;

    match format.bits_per_sample() {
        8 => {
            for &byte in asset.samples() {
                // hound takes signed 8-bit and stores it unsigned
                writer
                    .write_sample((byte as i16 - 128) as i8)
                    .map_err(hound_to_io)?;
            }
        }
        _ => {
            for pair in asset.samples().chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .map_err(hound_to_io)?;
            }
        }
    }

    writer.finalize().map_err(hound_to_io)?;
    Ok(())
}

/// Generate a 16-bit mono sine tone
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz (must be positive)
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> Result<AudioAsset> {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate.max(1) as f32;

    let mut samples = Vec::with_capacity(num_frames * 2);
    for i in 0..num_frames {
        let value = ((angular_freq * i as f32).sin() * 0.8 * 32767.0) as i16;
        samples.extend_from_slice(&value.to_le_bytes());
    }

    AudioAsset::with_format(BufferFormat::Mono16, sample_rate, samples)
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Map a WAV header onto a backend format, rejecting float PCM outright
fn resolve_format(spec: &WavSpec) -> Result<BufferFormat> {
    if spec.sample_format == SampleFormat::Float {
        return Err(HaasError::UnsupportedFormat {
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            float: true,
        });
    }

    BufferFormat::from_layout(spec.channels, spec.bits_per_sample)
}

/// Read all samples back into the raw byte layout the backend expects
fn read_sample_bytes<R: std::io::Read>(
    mut reader: WavReader<R>,
    format: BufferFormat,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(reader.len() as usize * format.bytes_per_sample());

    match format.bits_per_sample() {
        8 => {
            // hound hands 8-bit audio back as signed; the backend wants unsigned
            for sample in reader.samples::<i8>() {
                let value = sample.map_err(|e| invalid_samples(8, e))?;
                bytes.push((value as i16 + 128) as u8);
            }
        }
        _ => {
            for sample in reader.samples::<i16>() {
                let value = sample.map_err(|e| invalid_samples(16, e))?;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    Ok(bytes)
}

fn invalid_samples(bits: u16, e: hound::Error) -> HaasError {
    HaasError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits, e),
        source: Some(Box::new(e)),
    }
}

fn hound_to_io(e: hound::Error) -> HaasError {
    match e {
        hound::Error::IoError(io) => HaasError::Io(io),
        other => HaasError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_raw_wav(path: &Path, spec: WavSpec, frames: usize) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames * spec.channels as usize {
            match (spec.sample_format, spec.bits_per_sample) {
                (SampleFormat::Float, _) => writer.write_sample(0.25f32).unwrap(),
                (SampleFormat::Int, 8) => writer.write_sample((i % 100) as i8).unwrap(),
                (SampleFormat::Int, 16) => writer.write_sample((i as i16) * 3).unwrap(),
                (SampleFormat::Int, _) => writer.write_sample(i as i32).unwrap(),
            }
        }
        writer.finalize().unwrap();
    }

    fn int_spec(channels: u16, bits_per_sample: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_generate_test_tone() {
        let asset = generate_test_tone(440.0, 1.0, 44100).unwrap();

        assert_eq!(asset.format(), BufferFormat::Mono16);
        assert_eq!(asset.frame_count(), 44100);
        assert_eq!(asset.duration(), Duration::from_secs(1));

        // First sample of a sine is silence, a quarter period later is near peak
        assert_eq!(asset.format().sample_to_f32(asset.samples(), 0), 0.0);
        let quarter = (44100.0 / 440.0 / 4.0) as usize;
        assert!(asset.format().sample_to_f32(asset.samples(), quarter) > 0.7);
    }

    #[test]
    fn test_load_supported_layouts() {
        let dir = tempdir().unwrap();

        for (channels, bits) in [(1, 8), (2, 8), (1, 16), (2, 16)] {
            let path = dir.path().join(format!("tone_{}_{}.wav", channels, bits));
            write_raw_wav(&path, int_spec(channels, bits), 400);

            let asset = load_wav(&path).unwrap();
            assert_eq!(asset.channel_count(), channels);
            assert_eq!(asset.bits_per_sample(), bits);
            assert_eq!(asset.sample_rate(), 8000);
            assert_eq!(asset.frame_count(), 400);
            assert_eq!(asset.duration(), Duration::from_millis(50));
        }
    }

    #[test]
    fn test_8bit_samples_stay_unsigned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eight.wav");
        write_raw_wav(&path, int_spec(1, 8), 4);

        // Signed 0, 1, 2, 3 stored unsigned as 128..131
        let asset = load_wav(&path).unwrap();
        assert_eq!(asset.samples(), &[128, 129, 130, 131]);
    }

    #[test]
    fn test_16bit_samples_little_endian() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sixteen.wav");
        write_raw_wav(&path, int_spec(1, 16), 2);

        let asset = load_wav(&path).unwrap();
        assert_eq!(asset.samples(), &[0, 0, 3, 0]);
    }

    #[test]
    fn test_load_24bit_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep.wav");
        write_raw_wav(&path, int_spec(1, 24), 10);

        match load_wav(&path) {
            Err(HaasError::UnsupportedFormat {
                channels,
                bits_per_sample,
                float,
            }) => {
                assert_eq!(channels, 1);
                assert_eq!(bits_per_sample, 24);
                assert!(!float);
            }
            other => panic!("Expected UnsupportedFormat error, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_float_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        write_raw_wav(&path, spec, 10);

        match load_wav(&path) {
            Err(HaasError::UnsupportedFormat { float, .. }) => assert!(float),
            other => panic!("Expected UnsupportedFormat error, got: {:?}", other),
        }
    }

    #[test]
    fn test_export_then_load_keeps_bytes() {
        let dir = tempdir().unwrap();

        let tone = generate_test_tone(1000.0, 0.1, 22050).unwrap();
        let path = dir.path().join("tone.wav");
        export_wav(&tone, &path).unwrap();
        assert_eq!(load_wav(&path).unwrap(), tone);

        let eight = AudioAsset::new(2, 8, 11025, vec![0, 128, 255, 64]).unwrap();
        let path = dir.path().join("eight_stereo.wav");
        export_wav(&eight, &path).unwrap();
        assert_eq!(load_wav(&path).unwrap(), eight);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_wav(Path::new("/nonexistent/path/audio.wav"));

        match result.unwrap_err() {
            HaasError::FileNotFound { path } => {
                assert!(path.contains("nonexistent"));
            }
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        let err = load_wav(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");
    }
}
