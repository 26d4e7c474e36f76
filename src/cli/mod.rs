//! CLI Module
//!
//! Command-line interface for the Haas precedence-effect demo.

pub mod commands;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::scheduler::{CompletionWait, PlaybackConfig, DEFAULT_DELAY_MS};

/// Haas effect demo - plays a WAV file from the center, left and right
#[derive(Parser, Debug)]
#[command(name = "haas-cli")]
#[command(version, about, long_about = None)]
#[command(after_help = "Only one audio file is accepted. Paths containing spaces must be quoted.")]
pub struct Cli {
    /// PCM WAV file to play (mono or stereo, 8-bit or 16-bit)
    #[arg(required_unless_present = "list_devices")]
    pub file: Option<PathBuf>,

    /// Delay between the first and second side source, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
    pub delay_ms: u64,

    /// Output device name (default device if omitted)
    #[arg(long)]
    pub device: Option<String>,

    /// Print the names accepted by --device and exit
    #[arg(long, conflicts_with_all = ["file", "dry_run"])]
    pub list_devices: bool,

    /// How to decide that a playback has finished
    #[arg(long, value_enum, default_value_t = WaitMode::Nominal)]
    pub wait: WaitMode,

    /// Record backend calls instead of playing through a device
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WaitMode {
    /// Wait for the file's nominal duration
    Nominal,
    /// Wait until the backend reports the sources stopped
    UntilStopped,
}

impl From<WaitMode> for CompletionWait {
    fn from(mode: WaitMode) -> Self {
        match mode {
            WaitMode::Nominal => CompletionWait::Nominal,
            WaitMode::UntilStopped => CompletionWait::UntilStopped,
        }
    }
}

impl Cli {
    /// Scheduler settings selected on the command line
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig::default()
            .with_delay_ms(self.delay_ms)
            .with_completion(self.wait.into())
            .with_device(self.device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_single_file_argument() {
        let cli = Cli::try_parse_from(["haas-cli", "tone.wav"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("tone.wav")));
        assert_eq!(cli.delay_ms, 15);
        assert_eq!(cli.wait, WaitMode::Nominal);
        assert!(!cli.dry_run);
        assert!(!cli.list_devices);
    }

    #[test]
    fn test_list_devices_needs_no_file() {
        let cli = Cli::try_parse_from(["haas-cli", "--list-devices"]).unwrap();
        assert!(cli.list_devices);
        assert_eq!(cli.file, None);

        let err = Cli::try_parse_from(["haas-cli", "--list-devices", "tone.wav"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_missing_file_is_usage_error() {
        let err = Cli::try_parse_from(["haas-cli"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_extra_file_is_usage_error() {
        let err = Cli::try_parse_from(["haas-cli", "my", "song.wav"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_path_with_spaces_as_one_argument() {
        let cli = Cli::try_parse_from(["haas-cli", "my song.wav"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("my song.wav")));
    }

    #[test]
    fn test_playback_config_from_flags() {
        let cli = Cli::try_parse_from([
            "haas-cli",
            "--delay-ms",
            "25",
            "--wait",
            "until-stopped",
            "--device",
            "Speakers",
            "tone.wav",
        ])
        .unwrap();

        let config = cli.playback_config();
        assert_eq!(config.delay_ms, 25);
        assert_eq!(config.completion, CompletionWait::UntilStopped);
        assert_eq!(config.device.as_deref(), Some("Speakers"));
    }
}
