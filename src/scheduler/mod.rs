//! Spatial Playback Scheduler
//!
//! Plays one shared buffer through three fixed virtual sources (left,
//! center, right). A left or right bias triggers the biased source first and
//! the opposite source `delay_ms` later, so the listener localizes the sound
//! toward the source that started first (precedence effect).
//!
//! Lifecycle:
//! - `new`/`with_config`: open device and context, upload the buffer once,
//!   create the three sources and queue the buffer on each
//! - `play_from`: any number of times while `Ready`
//! - `close`: release sources, buffer, context and device; terminal

pub mod timing;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::{
    AudioBackend, BufferHandle, ContextHandle, DeviceHandle, SourceHandle, SourceParam,
    SourceState,
};
use crate::engine::AudioAsset;
use crate::error::{HaasError, Result};

pub use timing::{precise_sleep, precise_sleep_until, CancelToken};

/// Default gap between the two side sources, in milliseconds
pub const DEFAULT_DELAY_MS: u64 = 15;

/// Gain of the source that plays first
pub const LEAD_GAIN: f32 = 0.5;

/// Gain of the source that plays second
pub const LAG_GAIN: f32 = 0.4;

/// Extra time allowed past the nominal duration when waiting for sources to stop
const COMPLETION_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Positions
// ============================================================================

/// Perceived direction of one playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bias {
    Left,
    Right,
    Center,
}

impl Bias {
    /// Order the demo plays the asset in
    pub const DEMO_ORDER: [Bias; 3] = [Bias::Center, Bias::Left, Bias::Right];

    /// Parse a position name, treating anything unknown as `Center`
    ///
    /// Kept for callers that relied on the permissive behaviour; prefer
    /// `str::parse`, which rejects unknown names.
    pub fn from_name_lenient(name: &str) -> Bias {
        name.parse().unwrap_or_else(|_| {
            warn!("Unknown position '{}', playing from the center", name);
            Bias::Center
        })
    }

    /// The (first, second) side sources for this bias; `None` for center
    pub fn lead_and_lag(self) -> Option<(SourcePosition, SourcePosition)> {
        match self {
            Bias::Left => Some((SourcePosition::Left, SourcePosition::Right)),
            Bias::Right => Some((SourcePosition::Right, SourcePosition::Left)),
            Bias::Center => None,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Left => write!(f, "left"),
            Bias::Right => write!(f, "right"),
            Bias::Center => write!(f, "center"),
        }
    }
}

impl FromStr for Bias {
    type Err = HaasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Bias::Left),
            "right" => Ok(Bias::Right),
            "center" => Ok(Bias::Center),
            _ => Err(HaasError::InvalidBias {
                name: s.to_string(),
            }),
        }
    }
}

/// Fixed location of a virtual source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourcePosition {
    Left,
    Center,
    Right,
}

impl SourcePosition {
    pub const ALL: [SourcePosition; 3] = [
        SourcePosition::Left,
        SourcePosition::Center,
        SourcePosition::Right,
    ];

    /// Listener-relative (x, y, z)
    pub fn coordinates(self) -> [f32; 3] {
        match self {
            SourcePosition::Left => [-1.0, 0.0, 0.0],
            SourcePosition::Center => [0.0, 0.0, 0.0],
            SourcePosition::Right => [1.0, 0.0, 0.0],
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// How `play_from` decides the audio has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionWait {
    /// Sleep for the asset's nominal duration after the last trigger
    #[default]
    Nominal,
    /// Sleep the nominal duration, then poll until every triggered source
    /// reports stopped (bounded by a one second grace period)
    UntilStopped,
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Delay used by [`SpatialPlaybackScheduler::play`]
    pub delay_ms: u64,
    pub completion: CompletionWait,
    /// Output device name; `None` opens the default device
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            delay_ms: DEFAULT_DELAY_MS,
            completion: CompletionWait::Nominal,
            device: None,
        }
    }
}

impl PlaybackConfig {
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_completion(mut self, completion: CompletionWait) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Ready,
    /// Terminal; every operation fails with `SchedulerClosed`
    Closed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Ready => write!(f, "Ready"),
            SchedulerState::Closed => write!(f, "Closed"),
        }
    }
}

/// One of the three backend sources owned by a scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSource {
    handle: SourceHandle,
    position: SourcePosition,
    gain: f32,
}

impl VirtualSource {
    pub fn handle(&self) -> SourceHandle {
        self.handle
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }

    /// Gain last assigned by the scheduler
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

/// Handles acquired so far; released in reverse order
#[derive(Debug)]
struct Resources {
    device: DeviceHandle,
    context: Option<ContextHandle>,
    buffer: Option<BufferHandle>,
    sources: Vec<SourceHandle>,
}

impl Resources {
    fn new(device: DeviceHandle) -> Self {
        Self {
            device,
            context: None,
            buffer: None,
            sources: Vec::new(),
        }
    }

    /// Release everything, continuing past failures; reports the first one
    fn release<B: AudioBackend>(self, backend: &mut B) -> Result<()> {
        let mut first_error: Option<HaasError> = None;
        let mut check = |result: Result<()>, step: &str| {
            if let Err(e) = result {
                warn!("Cleanup step '{}' failed: {}", step, e);
                first_error.get_or_insert(e);
            }
        };

        if let Some(context) = self.context {
            check(backend.make_context_current(Some(context)), "make context current");
            for source in self.sources.iter().rev() {
                check(backend.delete_source(*source), "delete source");
            }
            if let Some(buffer) = self.buffer {
                check(backend.delete_buffer(buffer), "delete buffer");
            }
            check(backend.make_context_current(None), "clear current context");
            check(backend.destroy_context(context), "destroy context");
        }
        check(backend.close_device(self.device), "close device");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct PlaybackSession {
    device: DeviceHandle,
    context: ContextHandle,
    buffer: BufferHandle,
    sources: Vec<VirtualSource>,
}

impl PlaybackSession {
    fn source(&self, position: SourcePosition) -> Result<&VirtualSource> {
        self.sources
            .iter()
            .find(|source| source.position == position)
            .ok_or_else(|| HaasError::backend(format!("no {:?} source", position)))
    }

    fn set_gain<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        position: SourcePosition,
        gain: f32,
    ) -> Result<()> {
        let source = self
            .sources
            .iter_mut()
            .find(|source| source.position == position)
            .ok_or_else(|| HaasError::backend(format!("no {:?} source", position)))?;

        backend.set_source_param(source.handle, SourceParam::Gain(gain))?;
        source.gain = gain;
        Ok(())
    }

    fn into_resources(self) -> Resources {
        Resources {
            device: self.device,
            context: Some(self.context),
            buffer: Some(self.buffer),
            sources: self.sources.iter().map(|source| source.handle).collect(),
        }
    }
}

/// Open device and context, upload the asset, and build the three sources
///
/// On failure everything acquired so far is released before the error is
/// returned.
fn open_session<B: AudioBackend>(
    backend: &mut B,
    asset: &AudioAsset,
    device_name: Option<&str>,
) -> Result<PlaybackSession> {
    let device = backend.open_device(device_name)?;
    let mut resources = Resources::new(device);

    match populate_session(backend, asset, &mut resources) {
        Ok(sources) => Ok(PlaybackSession {
            device,
            context: resources.context.ok_or_else(|| HaasError::backend("context missing"))?,
            buffer: resources.buffer.ok_or_else(|| HaasError::backend("buffer missing"))?,
            sources,
        }),
        Err(e) => {
            warn!("Playback setup failed ({}), releasing partial session", e);
            // The setup error is the one worth reporting
            let _ = resources.release(backend);
            Err(e)
        }
    }
}

fn populate_session<B: AudioBackend>(
    backend: &mut B,
    asset: &AudioAsset,
    resources: &mut Resources,
) -> Result<Vec<VirtualSource>> {
    let context = backend.create_context(resources.device)?;
    resources.context = Some(context);
    backend.make_context_current(Some(context))?;

    let buffer = backend.create_buffer()?;
    resources.buffer = Some(buffer);
    backend
        .buffer_data(buffer, asset.format(), asset.samples(), asset.sample_rate())
        .map_err(|e| match e {
            HaasError::BufferUpload { .. } => e,
            other => HaasError::BufferUpload {
                reason: other.to_string(),
            },
        })?;
    debug!(
        "Uploaded {} bytes ({}, tag {:#06x}) to {}",
        asset.samples().len(),
        asset.format(),
        asset.format().tag(),
        buffer
    );

    let mut sources = Vec::with_capacity(SourcePosition::ALL.len());
    for position in SourcePosition::ALL {
        let handle = backend.create_source()?;
        resources.sources.push(handle);

        for param in [
            SourceParam::Pitch(1.0),
            SourceParam::Gain(1.0),
            SourceParam::Velocity([0.0, 0.0, 0.0]),
            SourceParam::Looping(false),
            SourceParam::Position(position.coordinates()),
        ] {
            backend.set_source_param(handle, param)?;
        }
        backend.queue_buffer(handle, buffer)?;

        sources.push(VirtualSource {
            handle,
            position,
            gain: 1.0,
        });
    }

    Ok(sources)
}

// ============================================================================
// Scheduler
// ============================================================================

/// Precedence-effect playback of one asset over three virtual sources
pub struct SpatialPlaybackScheduler<B: AudioBackend> {
    backend: B,
    session: Option<PlaybackSession>,
    config: PlaybackConfig,
    duration: Duration,
    cancel: CancelToken,
}

impl<B: AudioBackend> SpatialPlaybackScheduler<B> {
    /// Bind `asset` to a fresh session on `backend` with default settings
    ///
    /// # Errors
    /// * `Backend` - If the device, context or sources cannot be created
    /// * `BufferUpload` - If the backend rejects the sample data
    pub fn new(backend: B, asset: &AudioAsset) -> Result<Self> {
        Self::with_config(backend, asset, PlaybackConfig::default())
    }

    pub fn with_config(mut backend: B, asset: &AudioAsset, config: PlaybackConfig) -> Result<Self> {
        let session = open_session(&mut backend, asset, config.device.as_deref())?;
        info!(
            "Playback session ready: {} at {} Hz, {:.3}s",
            asset.format(),
            asset.sample_rate(),
            asset.duration().as_secs_f64()
        );

        Ok(Self {
            backend,
            session: Some(session),
            config,
            duration: asset.duration(),
            cancel: CancelToken::new(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        if self.session.is_some() {
            SchedulerState::Ready
        } else {
            SchedulerState::Closed
        }
    }

    /// Nominal playback length of the bound asset
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Token that interrupts the waits inside `play_from`
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The source at `position`, or `None` once closed
    pub fn source(&self, position: SourcePosition) -> Option<&VirtualSource> {
        self.session
            .as_ref()
            .and_then(|session| session.source(position).ok())
    }

    /// Play with the configured delay
    pub fn play(&mut self, bias: Bias) -> Result<()> {
        self.play_from(bias, self.config.delay_ms)
    }

    /// Play the asset so it is perceived from `bias`, blocking until done
    ///
    /// Center plays the center source alone and leaves every gain untouched.
    /// Left/right set the biased source to [`LEAD_GAIN`] and the opposite
    /// one to [`LAG_GAIN`], trigger the biased source, wait `delay_ms` of
    /// wall-clock time, then trigger the opposite source.
    ///
    /// # Errors
    /// * `SchedulerClosed` - After `close`
    /// * `Interrupted` - If the cancel token is already set (nothing plays)
    ///   or fires during a wait (the second source is not triggered)
    /// * `Backend` - If a backend call fails
    pub fn play_from(&mut self, bias: Bias, delay_ms: u64) -> Result<()> {
        let Self {
            backend,
            session,
            config,
            duration,
            cancel,
        } = self;
        let session = session.as_mut().ok_or(HaasError::SchedulerClosed)?;

        backend.make_context_current(Some(session.context))?;
        if cancel.is_cancelled() {
            return Err(HaasError::Interrupted);
        }
        info!("Playing from the {} (delay {} ms)", bias, delay_ms);

        let triggered = match bias.lead_and_lag() {
            None => {
                let center = session.source(SourcePosition::Center)?.handle;
                backend.play(center)?;
                debug!("Triggered center {}", center);
                vec![center]
            }
            Some((lead, lag)) => {
                session.set_gain(backend, lead, LEAD_GAIN)?;
                session.set_gain(backend, lag, LAG_GAIN)?;
                let lead = session.source(lead)?.handle;
                let lag = session.source(lag)?.handle;

                backend.play(lead)?;
                let lead_at = Instant::now();
                if !precise_sleep(Duration::from_millis(delay_ms), cancel) {
                    return Err(HaasError::Interrupted);
                }
                backend.play(lag)?;
                debug!(
                    "Triggered {} then {} after {:.3} ms",
                    lead,
                    lag,
                    lead_at.elapsed().as_secs_f64() * 1000.0
                );
                vec![lead, lag]
            }
        };

        wait_for_completion(backend, &triggered, *duration, config.completion, cancel)
    }

    /// Release the sources, buffer, context and device
    ///
    /// Only the first call does anything; later calls return
    /// `SchedulerClosed` without touching the backend.
    pub fn close(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(HaasError::SchedulerClosed)?;
        info!("Closing playback session");
        session.into_resources().release(&mut self.backend)
    }
}

impl<B: AudioBackend> Drop for SpatialPlaybackScheduler<B> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.into_resources().release(&mut self.backend) {
                warn!("Failed to release playback session on drop: {}", e);
            }
        }
    }
}

fn wait_for_completion<B: AudioBackend>(
    backend: &B,
    triggered: &[SourceHandle],
    duration: Duration,
    completion: CompletionWait,
    cancel: &CancelToken,
) -> Result<()> {
    let nominal_end = Instant::now() + duration;
    if !timing::wait_until(nominal_end, cancel) {
        return Err(HaasError::Interrupted);
    }

    if completion == CompletionWait::Nominal {
        return Ok(());
    }

    let mut failure = None;
    let outcome = timing::poll_until(nominal_end + COMPLETION_GRACE, cancel, || {
        let mut all_stopped = true;
        for source in triggered {
            match backend.source_state(*source) {
                Ok(SourceState::Stopped) => {}
                Ok(_) => all_stopped = false,
                Err(e) => {
                    failure = Some(e);
                    return true;
                }
            }
        }
        all_stopped
    });

    if let Some(e) = failure {
        return Err(e);
    }
    match outcome {
        Some(true) => Ok(()),
        Some(false) => {
            warn!("Sources still playing {:?} past nominal duration", COMPLETION_GRACE);
            Ok(())
        }
        None => Err(HaasError::Interrupted),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
