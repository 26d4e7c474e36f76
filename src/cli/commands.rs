//! CLI Command Implementations
//!
//! Runs the three-position demonstration: center, left, right.

use std::io::Write;
use std::path::Path;

use log::info;

use crate::backend::{AudioBackend, RecordingBackend};
use crate::engine::{load_wav, AudioAsset};
use crate::error::Result;
use crate::scheduler::{Bias, PlaybackConfig, SpatialPlaybackScheduler};

/// Load `path` and play it from each demo position on the selected backend.
pub fn play_file(path: &Path, config: PlaybackConfig, dry_run: bool) -> Result<()> {
    let asset = load_wav(path)?;
    let name = display_name(path);
    let mut stdout = std::io::stdout();

    if dry_run {
        info!("Dry run: no audio will reach a device");
        return run_demo(RecordingBackend::new(), &asset, &name, config, &mut stdout);
    }

    play_on_device(&asset, &name, config, &mut stdout)
}

#[cfg(feature = "playback")]
fn play_on_device<W: Write>(
    asset: &AudioAsset,
    name: &str,
    config: PlaybackConfig,
    out: &mut W,
) -> Result<()> {
    run_demo(crate::backend::DeviceBackend::new(), asset, name, config, out)
}

#[cfg(not(feature = "playback"))]
fn play_on_device<W: Write>(
    _asset: &AudioAsset,
    _name: &str,
    _config: PlaybackConfig,
    _out: &mut W,
) -> Result<()> {
    Err(crate::error::HaasError::backend(
        "built without the `playback` feature; use --dry-run",
    ))
}

/// Print the output devices `--device` accepts, one per line
pub fn list_devices<W: Write>(out: &mut W) -> Result<()> {
    let names = output_device_names()?;
    write_device_list(&names, out)
}

#[cfg(feature = "playback")]
fn output_device_names() -> Result<Vec<String>> {
    crate::backend::DeviceBackend::list_output_devices()
}

#[cfg(not(feature = "playback"))]
fn output_device_names() -> Result<Vec<String>> {
    Err(crate::error::HaasError::backend(
        "built without the `playback` feature; no devices to list",
    ))
}

fn write_device_list<W: Write>(names: &[String], out: &mut W) -> Result<()> {
    if names.is_empty() {
        writeln!(out, "No output devices found.")?;
        return Ok(());
    }
    for name in names {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

/// Play `asset` from the center, the left and the right, in that order,
/// writing one status line before and after each.
pub fn run_demo<B: AudioBackend, W: Write>(
    backend: B,
    asset: &AudioAsset,
    name: &str,
    config: PlaybackConfig,
    out: &mut W,
) -> Result<()> {
    let mut scheduler = SpatialPlaybackScheduler::with_config(backend, asset, config)?;

    for bias in Bias::DEMO_ORDER {
        writeln!(out, "Playing {} perceived from the {}.", name, bias)?;
        out.flush()?;
        scheduler.play(bias)?;
        writeln!(out, "Done playing.\n")?;
    }

    scheduler.close()
}

/// File name shown in status lines
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendCall;

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name(Path::new("/tmp/sounds/clap.wav")), "clap.wav");
        assert_eq!(display_name(Path::new("clap.wav")), "clap.wav");
    }

    #[test]
    fn test_demo_output_and_order() {
        let backend = RecordingBackend::new();
        let observer = backend.clone();
        let asset = AudioAsset::new(1, 8, 8000, vec![128; 160]).unwrap();
        let mut out = Vec::new();

        run_demo(backend, &asset, "click.wav", PlaybackConfig::default(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Playing click.wav perceived from the center.\nDone playing.\n\n\
             Playing click.wav perceived from the left.\nDone playing.\n\n\
             Playing click.wav perceived from the right.\nDone playing.\n\n"
        );

        // center once, then two side triggers per biased play
        assert_eq!(observer.play_log().len(), 5);
        assert_eq!(observer.live_handles(), 0);
        assert!(matches!(
            observer.calls().last(),
            Some(BackendCall::CloseDevice { .. })
        ));
    }

    #[test]
    fn test_device_list_output() {
        let mut out = Vec::new();
        let names = vec!["Built-in Output".to_string(), "USB DAC".to_string()];
        write_device_list(&names, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Built-in Output\nUSB DAC\n");

        let mut out = Vec::new();
        write_device_list(&[], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No output devices found.\n");
    }

    #[test]
    fn test_missing_file_fails_before_playback() {
        let err = play_file(Path::new("/nonexistent/clap.wav"), PlaybackConfig::default(), true)
            .unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
