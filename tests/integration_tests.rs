//! Integration Tests
//!
//! End-to-end tests: WAV file on disk -> asset -> scheduled playback.

use std::path::Path;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::tempdir;

use haas::backend::{BackendCall, RecordingBackend};
use haas::cli::commands::run_demo;
use haas::engine::{export_wav, generate_test_tone, load_wav};
use haas::scheduler::{Bias, PlaybackConfig, SchedulerState, SourcePosition};
use haas::{HaasError, SpatialPlaybackScheduler};

/// Write `frames` frames of a ramp in the given layout
fn write_wav(path: &Path, channels: u16, bits_per_sample: u16, sample_rate: u32, frames: usize) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames * channels as usize {
        match bits_per_sample {
            8 => writer.write_sample((i % 64) as i8).unwrap(),
            16 => writer.write_sample((i % 1024) as i16).unwrap(),
            _ => writer.write_sample((i % 4096) as i32).unwrap(),
        }
    }
    writer.finalize().unwrap();
}

// === End-to-end timing ===

#[test]
fn test_one_second_tone_center_left_right() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    export_wav(&generate_test_tone(440.0, 1.0, 44100).unwrap(), &path).unwrap();

    let asset = load_wav(&path).unwrap();
    assert_eq!(asset.channel_count(), 1);
    assert_eq!(asset.bits_per_sample(), 16);
    assert_eq!(asset.frame_count(), 44100);

    let backend = RecordingBackend::new();
    let mut scheduler = SpatialPlaybackScheduler::new(backend, &asset).unwrap();

    let expected = [
        (Bias::Center, Duration::from_millis(1000)),
        (Bias::Left, Duration::from_millis(1015)),
        (Bias::Right, Duration::from_millis(1015)),
    ];

    for (bias, minimum) in expected {
        let start = Instant::now();
        scheduler.play_from(bias, 15).unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= minimum, "{} took {:?}", bias, elapsed);
        assert!(elapsed < minimum + Duration::from_millis(250), "{} took {:?}", bias, elapsed);
    }

    scheduler.close().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Closed);
}

#[test]
fn test_demo_plays_every_position() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stereo8.wav");
    write_wav(&path, 2, 8, 8000, 400);

    let asset = load_wav(&path).unwrap();
    let backend = RecordingBackend::new();
    let observer = backend.clone();
    let mut out = Vec::new();

    run_demo(backend, &asset, "stereo8.wav", PlaybackConfig::default(), &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().filter(|line| !line.is_empty()).collect();
    assert_eq!(
        lines,
        vec![
            "Playing stereo8.wav perceived from the center.",
            "Done playing.",
            "Playing stereo8.wav perceived from the left.",
            "Done playing.",
            "Playing stereo8.wav perceived from the right.",
            "Done playing.",
        ]
    );

    let calls = observer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        BackendCall::BufferData { bytes: 800, sample_rate: 8000, .. }
    )));
    assert_eq!(observer.live_handles(), 0);
}

// === Gains across a session ===

#[test]
fn test_gains_follow_last_biased_call() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mono16.wav");
    write_wav(&path, 1, 16, 16000, 320);

    let asset = load_wav(&path).unwrap();
    let backend = RecordingBackend::new();
    let observer = backend.clone();
    let mut scheduler = SpatialPlaybackScheduler::new(backend, &asset).unwrap();

    let left = scheduler.source(SourcePosition::Left).unwrap().handle();
    let right = scheduler.source(SourcePosition::Right).unwrap().handle();
    let center = scheduler.source(SourcePosition::Center).unwrap().handle();

    scheduler.play_from(Bias::Center, 15).unwrap();
    assert_relative_eq!(observer.gain(left).unwrap(), 1.0);
    assert_relative_eq!(observer.gain(right).unwrap(), 1.0);

    scheduler.play_from(Bias::Right, 15).unwrap();
    assert_relative_eq!(observer.gain(left).unwrap(), 0.4);
    assert_relative_eq!(observer.gain(right).unwrap(), 0.5);

    scheduler.play_from(Bias::Center, 15).unwrap();
    assert_relative_eq!(observer.gain(left).unwrap(), 0.4);
    assert_relative_eq!(observer.gain(right).unwrap(), 0.5);
    assert_relative_eq!(observer.gain(center).unwrap(), 1.0);
}

// === Rejection before any backend work ===

#[test]
fn test_unsupported_file_never_reaches_backend() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("deep.wav");
    write_wav(&path, 2, 24, 48000, 100);

    let backend = RecordingBackend::new();
    let result = load_wav(&path).and_then(|asset| SpatialPlaybackScheduler::new(backend.clone(), &asset));

    assert!(matches!(result, Err(HaasError::UnsupportedFormat { .. })));
    assert!(backend.events().is_empty());
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_missing_file_reports_not_found() {
    let dir = tempdir().unwrap();
    let err = load_wav(&dir.path().join("absent.wav")).unwrap_err();

    assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    assert!(!err.recovery_suggestions().is_empty());
}
