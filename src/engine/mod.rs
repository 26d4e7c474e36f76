//! Audio Asset Module
//!
//! Everything needed to turn a file on disk into something a backend can
//! play:
//! - Supported backend buffer formats
//! - The immutable decoded asset
//! - WAV file I/O

pub mod asset;
pub mod format;
pub mod io;

pub use asset::AudioAsset;
pub use format::BufferFormat;
pub use io::{export_wav, generate_test_tone, load_wav};
