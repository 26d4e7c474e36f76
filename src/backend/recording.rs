//! In-memory recording backend
//!
//! Plays nothing. Every successful call is journaled with the instant it was
//! made, so tests (and `--dry-run`) can check ordering, gains and timing of
//! source triggers. The backend also enforces the context discipline a real
//! OpenAL implementation expects: buffer and source calls fail unless the
//! context that owns the handle is current.
//!
//! Clones share one journal, which lets a test keep a handle for inspection
//! while the scheduler owns another.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use super::{
    AudioBackend, BufferHandle, ContextHandle, DeviceHandle, SourceHandle, SourceParam,
    SourceState,
};
use crate::engine::BufferFormat;
use crate::error::{HaasError, Result};

/// One backend call, as recorded
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    OpenDevice {
        device: DeviceHandle,
    },
    CreateContext {
        device: DeviceHandle,
        context: ContextHandle,
    },
    MakeContextCurrent {
        context: Option<ContextHandle>,
    },
    CreateBuffer {
        buffer: BufferHandle,
    },
    BufferData {
        buffer: BufferHandle,
        format: BufferFormat,
        bytes: usize,
        sample_rate: u32,
    },
    DeleteBuffer {
        buffer: BufferHandle,
    },
    CreateSource {
        source: SourceHandle,
    },
    SetSourceParam {
        source: SourceHandle,
        param: SourceParam,
    },
    QueueBuffer {
        source: SourceHandle,
        buffer: BufferHandle,
    },
    Play {
        source: SourceHandle,
    },
    DeleteSource {
        source: SourceHandle,
    },
    DestroyContext {
        context: ContextHandle,
    },
    CloseDevice {
        device: DeviceHandle,
    },
}

/// A journaled call with its timestamp
#[derive(Debug, Clone)]
pub struct BackendEvent {
    pub at: Instant,
    pub call: BackendCall,
}

/// Call that should fail when a [`RecordingBackend`] is built with
/// [`RecordingBackend::failing_at`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    OpenDevice,
    CreateContext,
    CreateBuffer,
    BufferData,
    CreateSource,
    QueueBuffer,
    Play,
}

#[derive(Debug)]
struct BufferRecord {
    context: ContextHandle,
    length: Duration,
}

#[derive(Debug)]
struct SourceRecord {
    context: ContextHandle,
    queue: Vec<BufferHandle>,
    gain: f32,
    started: Option<Instant>,
}

#[derive(Debug, Default)]
struct Journal {
    events: Vec<BackendEvent>,
    next_id: u32,
    devices: HashSet<DeviceHandle>,
    contexts: HashMap<ContextHandle, DeviceHandle>,
    current: Option<ContextHandle>,
    buffers: HashMap<BufferHandle, BufferRecord>,
    sources: HashMap<SourceHandle, SourceRecord>,
    fail_at: Option<FailPoint>,
}

impl Journal {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: BackendCall) {
        debug!("[recording] {:?}", call);
        self.events.push(BackendEvent {
            at: Instant::now(),
            call,
        });
    }

    fn check_fail(&self, point: FailPoint) -> Result<()> {
        if self.fail_at == Some(point) {
            let reason = format!("injected failure at {:?}", point);
            return Err(match point {
                FailPoint::BufferData => HaasError::BufferUpload { reason },
                _ => HaasError::backend(reason),
            });
        }
        Ok(())
    }

    fn current(&self) -> Result<ContextHandle> {
        self.current
            .ok_or_else(|| HaasError::backend("no current context"))
    }

    fn require_current(&self, owner: ContextHandle) -> Result<()> {
        match self.current {
            Some(current) if current == owner => Ok(()),
            _ => Err(HaasError::backend(format!("{} is not current", owner))),
        }
    }

    fn buffer(&self, buffer: BufferHandle) -> Result<&BufferRecord> {
        let record = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", buffer)))?;
        self.require_current(record.context)?;
        Ok(record)
    }

    fn source_mut(&mut self, source: SourceHandle) -> Result<&mut SourceRecord> {
        let context = self
            .sources
            .get(&source)
            .map(|record| record.context)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))?;
        self.require_current(context)?;
        self.sources
            .get_mut(&source)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))
    }
}

/// Backend that journals calls instead of producing sound
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Journal>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `point` call always fails
    pub fn failing_at(point: FailPoint) -> Self {
        let backend = Self::new();
        backend.journal().fail_at = Some(point);
        backend
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every successful call so far
    pub fn events(&self) -> Vec<BackendEvent> {
        self.journal().events.clone()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.journal()
            .events
            .iter()
            .map(|event| event.call.clone())
            .collect()
    }

    /// Every `play` call in order, with its timestamp
    pub fn play_log(&self) -> Vec<(SourceHandle, Instant)> {
        self.journal()
            .events
            .iter()
            .filter_map(|event| match event.call {
                BackendCall::Play { source } => Some((source, event.at)),
                _ => None,
            })
            .collect()
    }

    /// Last gain assigned to a live source
    pub fn gain(&self, source: SourceHandle) -> Option<f32> {
        self.journal().sources.get(&source).map(|record| record.gain)
    }

    pub fn current_context(&self) -> Option<ContextHandle> {
        self.journal().current
    }

    /// Number of devices, contexts, buffers and sources not yet released
    pub fn live_handles(&self) -> usize {
        let journal = self.journal();
        journal.devices.len() + journal.contexts.len() + journal.buffers.len() + journal.sources.len()
    }

    pub fn clear_events(&self) {
        self.journal().events.clear();
    }
}

impl AudioBackend for RecordingBackend {
    fn open_device(&mut self, _name: Option<&str>) -> Result<DeviceHandle> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::OpenDevice)?;

        let device = DeviceHandle(journal.next_id());
        journal.devices.insert(device);
        journal.record(BackendCall::OpenDevice { device });
        Ok(device)
    }

    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::CreateContext)?;
        if !journal.devices.contains(&device) {
            return Err(HaasError::backend(format!("{} is not open", device)));
        }

        let context = ContextHandle(journal.next_id());
        journal.contexts.insert(context, device);
        journal.record(BackendCall::CreateContext { device, context });
        Ok(context)
    }

    fn make_context_current(&mut self, context: Option<ContextHandle>) -> Result<()> {
        let mut journal = self.journal();
        if let Some(context) = context {
            if !journal.contexts.contains_key(&context) {
                return Err(HaasError::backend(format!("unknown {}", context)));
            }
        }

        journal.current = context;
        journal.record(BackendCall::MakeContextCurrent { context });
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferHandle> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::CreateBuffer)?;
        let context = journal.current()?;

        let buffer = BufferHandle(journal.next_id());
        journal.buffers.insert(
            buffer,
            BufferRecord {
                context,
                length: Duration::ZERO,
            },
        );
        journal.record(BackendCall::CreateBuffer { buffer });
        Ok(buffer)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: BufferFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        let mut journal = self.journal();
        journal.buffer(buffer)?;
        journal.check_fail(FailPoint::BufferData)?;
        if sample_rate == 0 || data.len() % format.bytes_per_frame() != 0 {
            return Err(HaasError::BufferUpload {
                reason: format!("{} bytes of {} at {} Hz", data.len(), format, sample_rate),
            });
        }

        let frames = data.len() / format.bytes_per_frame();
        if let Some(record) = journal.buffers.get_mut(&buffer) {
            record.length = Duration::from_secs_f64(frames as f64 / sample_rate as f64);
        }
        journal.record(BackendCall::BufferData {
            buffer,
            format,
            bytes: data.len(),
            sample_rate,
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let mut journal = self.journal();
        journal.buffer(buffer)?;

        journal.buffers.remove(&buffer);
        journal.record(BackendCall::DeleteBuffer { buffer });
        Ok(())
    }

    fn create_source(&mut self) -> Result<SourceHandle> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::CreateSource)?;
        let context = journal.current()?;

        let source = SourceHandle(journal.next_id());
        journal.sources.insert(
            source,
            SourceRecord {
                context,
                queue: Vec::new(),
                gain: 1.0,
                started: None,
            },
        );
        journal.record(BackendCall::CreateSource { source });
        Ok(source)
    }

    fn set_source_param(&mut self, source: SourceHandle, param: SourceParam) -> Result<()> {
        let mut journal = self.journal();
        let record = journal.source_mut(source)?;
        if let SourceParam::Gain(gain) = param {
            record.gain = gain;
        }

        journal.record(BackendCall::SetSourceParam { source, param });
        Ok(())
    }

    fn queue_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<()> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::QueueBuffer)?;
        journal.buffer(buffer)?;
        journal.source_mut(source)?.queue.push(buffer);

        journal.record(BackendCall::QueueBuffer { source, buffer });
        Ok(())
    }

    fn play(&mut self, source: SourceHandle) -> Result<()> {
        let mut journal = self.journal();
        journal.check_fail(FailPoint::Play)?;
        journal.source_mut(source)?.started = Some(Instant::now());

        journal.record(BackendCall::Play { source });
        Ok(())
    }

    fn source_state(&self, source: SourceHandle) -> Result<SourceState> {
        let journal = self.journal();
        let record = journal
            .sources
            .get(&source)
            .ok_or_else(|| HaasError::backend(format!("unknown {}", source)))?;
        journal.require_current(record.context)?;

        let Some(started) = record.started else {
            return Ok(SourceState::Initial);
        };

        let length: Duration = record
            .queue
            .iter()
            .filter_map(|buffer| journal.buffers.get(buffer))
            .map(|buffer| buffer.length)
            .sum();

        if started.elapsed() < length {
            Ok(SourceState::Playing)
        } else {
            Ok(SourceState::Stopped)
        }
    }

    fn delete_source(&mut self, source: SourceHandle) -> Result<()> {
        let mut journal = self.journal();
        journal.source_mut(source)?;

        journal.sources.remove(&source);
        journal.record(BackendCall::DeleteSource { source });
        Ok(())
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<()> {
        let mut journal = self.journal();
        if journal.contexts.remove(&context).is_none() {
            return Err(HaasError::backend(format!("unknown {}", context)));
        }
        if journal.current == Some(context) {
            journal.current = None;
        }

        journal.record(BackendCall::DestroyContext { context });
        Ok(())
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<()> {
        let mut journal = self.journal();
        if journal.contexts.values().any(|owner| *owner == device) {
            return Err(HaasError::backend(format!("{} still has contexts", device)));
        }
        if !journal.devices.remove(&device) {
            return Err(HaasError::backend(format!("{} is not open", device)));
        }

        journal.record(BackendCall::CloseDevice { device });
        Ok(())
    }
}
