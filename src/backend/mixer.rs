//! Software mixer behind the device backend
//!
//! Holds the buffers and sources of one context and renders them into an
//! interleaved stereo f32 block. Mono buffers are panned by the source's x
//! position with a constant-power law; stereo buffers play unpanned, as they
//! do in OpenAL.

use std::collections::HashMap;
use std::sync::Arc;

use super::{BufferHandle, SourceHandle, SourceParam, SourceState};
use crate::engine::BufferFormat;
use crate::error::{HaasError, Result};

/// Uploaded sample data
#[derive(Debug)]
pub(crate) struct PcmBuffer {
    format: BufferFormat,
    sample_rate: u32,
    data: Vec<u8>,
}

impl PcmBuffer {
    pub(crate) fn new(format: BufferFormat, sample_rate: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            sample_rate,
            data,
        }
    }

    fn frames(&self) -> usize {
        self.data.len() / self.format.bytes_per_frame()
    }

    fn frame(&self, index: usize) -> (f32, f32) {
        let channels = self.format.channels() as usize;
        let first = self.format.sample_to_f32(&self.data, index * channels);
        if channels == 1 {
            (first, first)
        } else {
            (first, self.format.sample_to_f32(&self.data, index * channels + 1))
        }
    }
}

#[derive(Debug)]
struct MixerSource {
    gain: f32,
    pitch: f32,
    position: [f32; 3],
    looping: bool,
    queue: Vec<Arc<PcmBuffer>>,
    queue_index: usize,
    cursor: f64,
    state: SourceState,
}

impl Default for MixerSource {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            position: [0.0; 3],
            looping: false,
            queue: Vec::new(),
            queue_index: 0,
            cursor: 0.0,
            state: SourceState::Initial,
        }
    }
}

impl MixerSource {
    /// Produce the next output frame, or `None` once the queue is exhausted
    fn next_frame(&mut self, output_rate: u32) -> Option<(f32, f32)> {
        // Each pass either finds a frame or moves to the next buffer
        for _ in 0..=self.queue.len() {
            let buffer = self.queue.get(self.queue_index)?;
            let index = self.cursor as usize;

            if index < buffer.frames() {
                let (left, right) = buffer.frame(index);
                self.cursor += self.pitch as f64 * buffer.sample_rate as f64 / output_rate as f64;

                let (pan_left, pan_right) = if buffer.format.channels() == 1 {
                    pan_gains(self.position[0])
                } else {
                    (1.0, 1.0)
                };
                return Some((left * pan_left * self.gain, right * pan_right * self.gain));
            }

            self.cursor -= buffer.frames() as f64;
            self.queue_index += 1;
            if self.queue_index >= self.queue.len() {
                if !self.looping {
                    return None;
                }
                self.queue_index = 0;
            }
        }
        None
    }
}

/// Constant-power pan: x = -1 is hard left, x = 1 hard right
pub(crate) fn pan_gains(x: f32) -> (f32, f32) {
    let x = x.clamp(-1.0, 1.0);
    (((1.0 - x) / 2.0).sqrt(), ((1.0 + x) / 2.0).sqrt())
}

/// Buffers and sources of one playback context
#[derive(Debug)]
pub(crate) struct Mixer {
    output_rate: u32,
    buffers: HashMap<BufferHandle, Option<Arc<PcmBuffer>>>,
    sources: HashMap<SourceHandle, MixerSource>,
}

impl Mixer {
    pub(crate) fn new(output_rate: u32) -> Self {
        Self {
            output_rate: output_rate.max(1),
            buffers: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    pub(crate) fn add_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.insert(buffer, None);
    }

    pub(crate) fn set_buffer_data(&mut self, buffer: BufferHandle, pcm: PcmBuffer) -> Result<()> {
        let slot = self.buffers.get_mut(&buffer).ok_or_else(|| HaasError::BufferUpload {
            reason: format!("unknown {}", buffer),
        })?;
        *slot = Some(Arc::new(pcm));
        Ok(())
    }

    pub(crate) fn remove_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or_else(|| HaasError::backend(format!("unknown {}", buffer)))
    }

    pub(crate) fn add_source(&mut self, source: SourceHandle) {
        self.sources.insert(source, MixerSource::default());
    }

    fn source_mut(&mut self, source: SourceHandle) -> Result<&mut MixerSource> {
        self.sources
            .get_mut(&source)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))
    }

    pub(crate) fn set_param(&mut self, source: SourceHandle, param: SourceParam) -> Result<()> {
        let source = self.source_mut(source)?;
        match param {
            SourceParam::Gain(gain) => source.gain = gain.max(0.0),
            SourceParam::Pitch(pitch) => source.pitch = pitch.max(0.0),
            SourceParam::Position(position) => source.position = position,
            // Doppler is not modelled
            SourceParam::Velocity(_) => {}
            SourceParam::Looping(looping) => source.looping = looping,
        }
        Ok(())
    }

    pub(crate) fn queue(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<()> {
        let pcm = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", buffer)))?
            .clone()
            .ok_or_else(|| HaasError::backend(format!("{} has no data", buffer)))?;
        self.source_mut(source)?.queue.push(pcm);
        Ok(())
    }

    pub(crate) fn play(&mut self, source: SourceHandle) -> Result<()> {
        let source = self.source_mut(source)?;
        source.queue_index = 0;
        source.cursor = 0.0;
        source.state = if source.queue.is_empty() {
            SourceState::Stopped
        } else {
            SourceState::Playing
        };
        Ok(())
    }

    pub(crate) fn state(&self, source: SourceHandle) -> Result<SourceState> {
        self.sources
            .get(&source)
            .map(|source| source.state)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))
    }

    pub(crate) fn remove_source(&mut self, source: SourceHandle) -> Result<()> {
        self.sources
            .remove(&source)
            .map(|_| ())
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))
    }

    /// Mix every playing source into `out` (interleaved L/R)
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let output_rate = self.output_rate;

        for source in self.sources.values_mut() {
            if source.state != SourceState::Playing {
                continue;
            }

            for frame in out.chunks_exact_mut(2) {
                match source.next_frame(output_rate) {
                    Some((left, right)) => {
                        frame[0] += left;
                        frame[1] += right;
                    }
                    None => {
                        source.state = SourceState::Stopped;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BUFFER: BufferHandle = BufferHandle(1);
    const SOURCE: SourceHandle = SourceHandle(2);

    fn constant_mono(value: i16, frames: usize, rate: u32) -> PcmBuffer {
        let data = (0..frames).flat_map(|_| value.to_le_bytes()).collect();
        PcmBuffer::new(BufferFormat::Mono16, rate, data)
    }

    fn mixer_with(pcm: PcmBuffer, output_rate: u32) -> Mixer {
        let mut mixer = Mixer::new(output_rate);
        mixer.add_buffer(BUFFER);
        mixer.set_buffer_data(BUFFER, pcm).unwrap();
        mixer.add_source(SOURCE);
        mixer.queue(SOURCE, BUFFER).unwrap();
        mixer
    }

    #[test]
    fn test_pan_law() {
        let (l, r) = pan_gains(-1.0);
        assert_relative_eq!(l, 1.0);
        assert_relative_eq!(r, 0.0);

        let (l, r) = pan_gains(1.0);
        assert_relative_eq!(l, 0.0);
        assert_relative_eq!(r, 1.0);

        let (l, r) = pan_gains(0.0);
        assert_relative_eq!(l, r);
        assert_relative_eq!(l * l + r * r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_idle_source_is_silent() {
        let mut mixer = mixer_with(constant_mono(16384, 8, 1000), 1000);
        let mut out = [1.0f32; 8];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_left_source_renders_left_only() {
        let mut mixer = mixer_with(constant_mono(16384, 8, 1000), 1000);
        mixer
            .set_param(SOURCE, SourceParam::Position([-1.0, 0.0, 0.0]))
            .unwrap();
        mixer.set_param(SOURCE, SourceParam::Gain(0.5)).unwrap();
        mixer.play(SOURCE).unwrap();

        let mut out = [0.0f32; 8];
        mixer.render(&mut out);

        for frame in out.chunks_exact(2) {
            assert_relative_eq!(frame[0], 0.25);
            assert_relative_eq!(frame[1], 0.0);
        }
    }

    #[test]
    fn test_source_stops_at_end() {
        let mut mixer = mixer_with(constant_mono(16384, 3, 1000), 1000);
        mixer.play(SOURCE).unwrap();
        assert_eq!(mixer.state(SOURCE).unwrap(), SourceState::Playing);

        let mut out = [0.0f32; 10];
        mixer.render(&mut out);

        assert_eq!(mixer.state(SOURCE).unwrap(), SourceState::Stopped);
        assert!(out[..6].iter().all(|&s| s > 0.0));
        assert!(out[6..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_rate_conversion_advances_cursor() {
        // 4 source frames at half the output rate last 8 output frames
        let mut mixer = mixer_with(constant_mono(16384, 4, 500), 1000);
        mixer.play(SOURCE).unwrap();

        let mut out = [0.0f32; 16];
        mixer.render(&mut out);
        assert_eq!(mixer.state(SOURCE).unwrap(), SourceState::Playing);

        mixer.render(&mut out);
        assert_eq!(mixer.state(SOURCE).unwrap(), SourceState::Stopped);
    }

    #[test]
    fn test_looping_keeps_playing() {
        let mut mixer = mixer_with(constant_mono(16384, 2, 1000), 1000);
        mixer.set_param(SOURCE, SourceParam::Looping(true)).unwrap();
        mixer.play(SOURCE).unwrap();

        let mut out = [0.0f32; 20];
        mixer.render(&mut out);

        assert_eq!(mixer.state(SOURCE).unwrap(), SourceState::Playing);
        assert!(out.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_stereo_buffer_is_not_panned() {
        let data = [8192i16, -8192]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut mixer = mixer_with(PcmBuffer::new(BufferFormat::Stereo16, 1000, data), 1000);
        mixer
            .set_param(SOURCE, SourceParam::Position([1.0, 0.0, 0.0]))
            .unwrap();
        mixer.play(SOURCE).unwrap();

        let mut out = [0.0f32; 2];
        mixer.render(&mut out);
        assert_relative_eq!(out[0], 0.25);
        assert_relative_eq!(out[1], -0.25);
    }

    #[test]
    fn test_queue_requires_data() {
        let mut mixer = Mixer::new(1000);
        mixer.add_buffer(BUFFER);
        mixer.add_source(SOURCE);
        assert!(mixer.queue(SOURCE, BUFFER).is_err());
    }
}
