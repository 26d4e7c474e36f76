//! CPAL output-device backend
//!
//! Each playback context owns one output stream on its device. The stream
//! callback renders the context's [`Mixer`]; backend calls mutate the same
//! mixer under a mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn};

use super::mixer::{Mixer, PcmBuffer};
use super::{
    AudioBackend, BufferHandle, ContextHandle, DeviceHandle, SourceHandle, SourceParam,
    SourceState,
};
use crate::engine::BufferFormat;
use crate::error::{HaasError, Result};

struct OutputContext {
    device: DeviceHandle,
    mixer: Arc<Mutex<Mixer>>,
    _stream: cpal::Stream,
}

/// Backend that plays through a real output device
///
/// Triggers land on the mixer immediately but are only heard from the next
/// callback block, so the gap between two `play` calls is rounded to the
/// device period (often around 10 ms). OpenAL implementations quantize the
/// same way. The callback shares the mixer mutex with the control thread and
/// renders silence if the lock is poisoned.
pub struct DeviceBackend {
    host: cpal::Host,
    next_id: u32,
    devices: HashMap<DeviceHandle, cpal::Device>,
    contexts: HashMap<ContextHandle, OutputContext>,
    current: Option<ContextHandle>,
}

impl Default for DeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            next_id: 0,
            devices: HashMap::new(),
            contexts: HashMap::new(),
            current: None,
        }
    }

    /// Names of the output devices the host can see
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| HaasError::backend(format!("Failed to enumerate devices: {}", e)))?;

        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn find_device(&self, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            Some(wanted) => {
                let devices = self.host.output_devices().map_err(|e| {
                    HaasError::backend(format!("Failed to enumerate devices: {}", e))
                })?;

                for device in devices {
                    if device.name().map(|n| n == wanted).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(HaasError::backend(format!("Device '{}' not found", wanted)))
            }
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| HaasError::backend("No output device available")),
        }
    }

    fn mixer(&self) -> Result<MutexGuard<'_, Mixer>> {
        let context = self
            .current
            .and_then(|current| self.contexts.get(&current))
            .ok_or_else(|| HaasError::backend("no current context"))?;

        context
            .mixer
            .lock()
            .map_err(|_| HaasError::backend("mixer lock poisoned"))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                scratch.resize(frames * 2, 0.0);

                match mixer.lock() {
                    Ok(mut mixer) => mixer.render(&mut scratch),
                    Err(_) => scratch.fill(0.0),
                }

                for (frame, stereo) in data.chunks_mut(channels).zip(scratch.chunks_exact(2)) {
                    if channels == 1 {
                        frame[0] = T::from_sample((stereo[0] + stereo[1]) * 0.5);
                        continue;
                    }
                    for (channel, sample) in frame.iter_mut().enumerate() {
                        let value = stereo.get(channel).copied().unwrap_or(0.0);
                        *sample = T::from_sample(value);
                    }
                }
            },
            |err| warn!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| HaasError::backend(format!("Failed to build output stream: {}", e)))
}

impl AudioBackend for DeviceBackend {
    fn open_device(&mut self, name: Option<&str>) -> Result<DeviceHandle> {
        let device = self.find_device(name)?;
        let handle = DeviceHandle(self.next_id());
        info!(
            "Opened output device '{}'",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        self.devices.insert(handle, device);
        Ok(handle)
    }

    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle> {
        let output = self
            .devices
            .get(&device)
            .ok_or_else(|| HaasError::backend(format!("{} is not open", device)))?;

        let supported = output
            .default_output_config()
            .map_err(|e| HaasError::backend(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0)));
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(output, &config, Arc::clone(&mixer))?,
            cpal::SampleFormat::I16 => build_stream::<i16>(output, &config, Arc::clone(&mixer))?,
            cpal::SampleFormat::U16 => build_stream::<u16>(output, &config, Arc::clone(&mixer))?,
            format => {
                return Err(HaasError::backend(format!(
                    "Unsupported device sample format: {:?}",
                    format
                )));
            }
        };
        stream
            .play()
            .map_err(|e| HaasError::backend(format!("Failed to start output stream: {}", e)))?;

        debug!(
            "Context stream: {} channel(s) at {} Hz ({:?})",
            config.channels, config.sample_rate.0, sample_format
        );

        let handle = ContextHandle(self.next_id());
        self.contexts.insert(
            handle,
            OutputContext {
                device,
                mixer,
                _stream: stream,
            },
        );
        Ok(handle)
    }

    fn make_context_current(&mut self, context: Option<ContextHandle>) -> Result<()> {
        if let Some(context) = context {
            if !self.contexts.contains_key(&context) {
                return Err(HaasError::backend(format!("unknown {}", context)));
            }
        }
        self.current = context;
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferHandle> {
        let handle = BufferHandle(self.next_id());
        self.mixer()?.add_buffer(handle);
        Ok(handle)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: BufferFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        if sample_rate == 0 || data.len() % format.bytes_per_frame() != 0 {
            return Err(HaasError::BufferUpload {
                reason: format!("{} bytes of {} at {} Hz", data.len(), format, sample_rate),
            });
        }

        let pcm = PcmBuffer::new(format, sample_rate, data.to_vec());
        self.mixer()?.set_buffer_data(buffer, pcm)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.mixer()?.remove_buffer(buffer)
    }

    fn create_source(&mut self) -> Result<SourceHandle> {
        let handle = SourceHandle(self.next_id());
        self.mixer()?.add_source(handle);
        Ok(handle)
    }

    fn set_source_param(&mut self, source: SourceHandle, param: SourceParam) -> Result<()> {
        self.mixer()?.set_param(source, param)
    }

    fn queue_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<()> {
        self.mixer()?.queue(source, buffer)
    }

    fn play(&mut self, source: SourceHandle) -> Result<()> {
        self.mixer()?.play(source)
    }

    fn source_state(&self, source: SourceHandle) -> Result<SourceState> {
        self.mixer()?.state(source)
    }

    fn delete_source(&mut self, source: SourceHandle) -> Result<()> {
        self.mixer()?.remove_source(source)
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<()> {
        // Dropping the stream stops it
        self.contexts
            .remove(&context)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", context)))?;

        if self.current == Some(context) {
            self.current = None;
        }
        Ok(())
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<()> {
        if self.contexts.values().any(|context| context.device == device) {
            return Err(HaasError::backend(format!("{} still has contexts", device)));
        }

        self.devices
            .remove(&device)
            .map(|_| ())
            .ok_or_else(|| HaasError::backend(format!("{} is not open", device)))
    }
}
