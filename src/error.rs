//! Error handling for Haas
//!
//! Every failure the scheduler, decoder, or a backend can report maps onto
//! one variant here. All of them are fatal for the one-shot demo tool.

use thiserror::Error;

/// Result type alias for Haas operations
pub type Result<T> = std::result::Result<T, HaasError>;

/// Main error type for Haas operations
#[derive(Error, Debug)]
pub enum HaasError {
    // Format Errors
    #[error("Unsupported audio format: {channels} channel(s), {bits_per_sample}-bit{}", float_suffix(.float))]
    UnsupportedFormat {
        channels: u16,
        bits_per_sample: u16,
        float: bool,
    },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid audio asset: {reason}")]
    InvalidAsset { reason: String },

    // Backend Errors
    #[error("Audio backend error: {reason}")]
    Backend { reason: String },

    #[error("Buffer upload failed: {reason}")]
    BufferUpload { reason: String },

    // Scheduler Errors
    #[error("Scheduler is closed")]
    SchedulerClosed,

    #[error("Unknown position: '{name}' (expected left, right or center)")]
    InvalidBias { name: String },

    #[error("Playback wait was interrupted")]
    Interrupted,

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn float_suffix(float: &bool) -> &'static str {
    if *float {
        " float"
    } else {
        ""
    }
}

impl HaasError {
    /// Shorthand for a backend failure with a formatted reason
    pub fn backend(reason: impl Into<String>) -> Self {
        HaasError::Backend {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            HaasError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            HaasError::FileNotFound { .. } => "FILE_NOT_FOUND",
            HaasError::InvalidAudio { .. } => "INVALID_AUDIO",
            HaasError::InvalidAsset { .. } => "INVALID_ASSET",
            HaasError::Backend { .. } => "BACKEND_ERROR",
            HaasError::BufferUpload { .. } => "BUFFER_UPLOAD_ERROR",
            HaasError::SchedulerClosed => "SCHEDULER_CLOSED",
            HaasError::InvalidBias { .. } => "INVALID_BIAS",
            HaasError::Interrupted => "INTERRUPTED",
            HaasError::Io(_) => "IO_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            HaasError::UnsupportedFormat { .. } => vec![
                "Convert the file to 8-bit or 16-bit integer PCM",
                "Supported layouts: mono-8, stereo-8, mono-16, stereo-16",
            ],
            HaasError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Wrap paths containing spaces in quotes",
            ],
            HaasError::InvalidAudio { .. } => vec![
                "Check if the file plays in another application",
                "The file may be corrupted - try re-exporting it as WAV",
            ],
            HaasError::Backend { .. } => vec![
                "Check that an output device is connected",
                "Try another device with --device, or --dry-run to skip output",
            ],
            HaasError::BufferUpload { .. } => vec!["The audio may be too large for the device"],
            _ => vec![],
        }
    }
}
