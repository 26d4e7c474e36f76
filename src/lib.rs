//! Haas - precedence-effect playback
//!
//! Plays a single PCM buffer through three virtual sources (left, center,
//! right) and staggers the start of the left and right sources by a few
//! milliseconds, so a listener hears one sound event biased toward the
//! source that started first.
//!
//! # Architecture
//!
//! - `engine`: decoded audio assets and WAV I/O
//! - `backend`: the playback capability the scheduler drives, with a
//!   recording implementation and a real output-device implementation
//! - `scheduler`: source setup, timed dual triggering and teardown
//! - `cli`: the center/left/right demonstration tool

pub mod backend;
pub mod cli;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use engine::{load_wav, AudioAsset, BufferFormat};
pub use error::{HaasError, Result};
pub use scheduler::{Bias, PlaybackConfig, SpatialPlaybackScheduler};
