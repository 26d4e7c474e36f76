//! Playback backend capability
//!
//! The scheduler never talks to an audio API directly. It drives an
//! [`AudioBackend`], a small OpenAL-shaped interface: devices own contexts,
//! exactly one context is current at a time, and buffers/sources are created
//! inside the current context.
//!
//! Passing the backend to the scheduler as a value (instead of relying on
//! process-wide "current context" state) lets several schedulers share one
//! backend, each re-asserting its own context before issuing calls.

pub mod recording;

#[cfg(feature = "playback")]
pub mod device;
#[cfg(feature = "playback")]
mod mixer;

use std::fmt;

use crate::engine::BufferFormat;
use crate::error::Result;

#[cfg(feature = "playback")]
pub use device::DeviceBackend;
pub use recording::{BackendCall, BackendEvent, FailPoint, RecordingBackend};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Opaque handle to an open output device
    DeviceHandle,
    "device"
);
handle_type!(
    /// Opaque handle to a playback context
    ContextHandle,
    "context"
);
handle_type!(
    /// Opaque handle to an uploaded sample buffer
    BufferHandle,
    "buffer"
);
handle_type!(
    /// Opaque handle to a virtual source
    SourceHandle,
    "source"
);

/// A single source property assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceParam {
    Pitch(f32),
    Gain(f32),
    Position([f32; 3]),
    Velocity([f32; 3]),
    Looping(bool),
}

/// Playback state of a source as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    /// Created but never played
    #[default]
    Initial,
    Playing,
    /// Played to the end of its queue
    Stopped,
}

/// OpenAL-shaped playback capability
///
/// Handles are only meaningful to the backend that issued them. Buffer and
/// source calls act on the current context; callers must make their context
/// current first.
pub trait AudioBackend {
    /// Open an output device, the default one when `name` is `None`
    fn open_device(&mut self, name: Option<&str>) -> Result<DeviceHandle>;

    /// Create a playback context on an open device
    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle>;

    /// Make `context` the current one (`None` clears it)
    fn make_context_current(&mut self, context: Option<ContextHandle>) -> Result<()>;

    fn create_buffer(&mut self) -> Result<BufferHandle>;

    /// Upload raw PCM into a buffer
    ///
    /// Implementations report rejected data as `HaasError::BufferUpload`.
    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: BufferFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()>;

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()>;

    fn create_source(&mut self) -> Result<SourceHandle>;

    fn set_source_param(&mut self, source: SourceHandle, param: SourceParam) -> Result<()>;

    /// Append a buffer to a source's play queue
    fn queue_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<()>;

    /// Start (or restart) playback of a source's queue
    fn play(&mut self, source: SourceHandle) -> Result<()>;

    fn source_state(&self, source: SourceHandle) -> Result<SourceState>;

    fn delete_source(&mut self, source: SourceHandle) -> Result<()>;

    fn destroy_context(&mut self, context: ContextHandle) -> Result<()>;

    fn close_device(&mut self, device: DeviceHandle) -> Result<()>;
}
