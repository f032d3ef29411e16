//! Integration Tests
//!
//! End-to-end tests for the stem engine: files on disk, transport control
//! through the public API, and offline export.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use stemmix::engine::io::generate_test_tone;
use stemmix::engine::{
    decode_audio, write_wav_file, AudioBuffer, AudioDevice, EngineState, FileLoader,
    HeadlessDevice, StemEngine, StemEngineBuilder,
};
use stemmix::config::EngineConfig;
use stemmix::StemError;

const RATE: u32 = 8000;

/// Write a constant-valued WAV and return its path as a locator
fn write_stem(dir: &Path, name: &str, secs: f64, value: f32, channels: usize) -> String {
    let frames = (secs * RATE as f64) as usize;
    let buffer = AudioBuffer::from_channels(vec![vec![value; frames]; channels], RATE).unwrap();
    let path = dir.join(name);
    write_wav_file(&buffer, &path).unwrap();
    path.display().to_string()
}

fn engine() -> StemEngine<HeadlessDevice> {
    StemEngineBuilder::new()
        .config(EngineConfig::default().with_export_sample_rate(RATE))
        .build(HeadlessDevice::new(RATE), FileLoader)
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// === Track Loading ===

#[test]
fn test_duration_tracks_longest_stem() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();

    let lengths = [1.5, 4.0, 2.5];
    for (i, secs) in lengths.iter().enumerate() {
        let path = write_stem(dir.path(), &format!("stem{}.wav", i), *secs, 0.1, 1);
        engine.add_track(&format!("t{}", i), "stem", &path).unwrap();
    }
    assert_relative_eq!(engine.duration(), 4.0, epsilon = 1e-9);

    engine.remove_track("t1").unwrap();
    assert_relative_eq!(engine.duration(), 4.0, epsilon = 1e-9);
    assert_eq!(engine.tracks().len(), 2);
}

#[test]
fn test_missing_file_sets_error_state() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let missing = dir.path().join("missing.wav");

    let err = engine
        .add_track("a", "A", &missing.display().to_string())
        .unwrap_err();
    assert!(matches!(err, StemError::SourceNotFound { .. }));
    assert_eq!(engine.state(), EngineState::Error);

    // dispose recovers from any state
    engine.dispose();
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_stems_are_resampled_to_device_rate() {
    let dir = TempDir::new().unwrap();
    let tone = generate_test_tone(220.0, 0.5, 1.0, 16000);
    let path = dir.path().join("hi-rate.wav");
    write_wav_file(&tone, &path).unwrap();

    let mut engine = engine();
    engine
        .add_track("tone", "Tone", &path.display().to_string())
        .unwrap();
    let track = engine.track("tone").unwrap();
    assert_eq!(track.buffer().sample_rate, RATE);
    assert_relative_eq!(engine.duration(), 1.0, epsilon = 1e-3);
}

// === Transport ===

#[test]
fn test_transport_round_trip() {
    let dir = TempDir::new().unwrap();
    let states = Rc::new(RefCell::new(Vec::new()));
    let times = Rc::new(RefCell::new(Vec::new()));
    let (state_sink, time_sink) = (Rc::clone(&states), Rc::clone(&times));

    let mut engine = StemEngineBuilder::new()
        .on_state_change(move |s| state_sink.borrow_mut().push(s))
        .on_time_update(move |t| time_sink.borrow_mut().push(t))
        .build(HeadlessDevice::new(RATE), FileLoader);

    let a = write_stem(dir.path(), "a.wav", 2.0, 0.2, 2);
    let b = write_stem(dir.path(), "b.wav", 1.0, 0.2, 1);
    engine.add_track("a", "A", &a).unwrap();
    engine.add_track("b", "B", &b).unwrap();

    engine.play().unwrap();
    engine.device_mut().advance(0.5);
    assert!(engine.tick());
    engine.pause();
    assert_relative_eq!(engine.current_time(), 0.5, epsilon = 1e-9);

    engine.seek(1.5).unwrap();
    engine.play().unwrap();
    // The shorter stem has already ended and gets a finished voice
    assert_eq!(engine.device().active_voices(), 2);

    engine.device_mut().advance(0.6);
    assert!(!engine.tick());
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.current_time(), 0.0);

    let times = times.borrow();
    assert_relative_eq!(times[0], 0.5, epsilon = 1e-9);
    assert_eq!(times.last().copied(), Some(0.0));

    let states = states.borrow();
    assert_eq!(states.first(), Some(&EngineState::Idle));
    assert_eq!(states.last(), Some(&EngineState::Ready));
    assert_eq!(
        states.iter().filter(|s| **s == EngineState::Playing).count(),
        2
    );
}

#[test]
fn test_rapid_play_pause_leaves_no_voices() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let a = write_stem(dir.path(), "a.wav", 2.0, 0.2, 2);
    engine.add_track("a", "A", &a).unwrap();

    for _ in 0..10 {
        engine.play().unwrap();
        engine.pause();
    }
    assert_eq!(engine.device().active_voices(), 0);
    assert!(!engine.tick());
    assert!(engine.tracks().iter().all(|t| !t.live));
}

#[test]
fn test_stop_from_every_state() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.stop();
    assert_eq!(engine.current_time(), 0.0);

    let a = write_stem(dir.path(), "a.wav", 2.0, 0.2, 2);
    engine.add_track("a", "A", &a).unwrap();
    engine.seek(1.0).unwrap();
    engine.stop();
    assert_eq!(engine.current_time(), 0.0);

    engine.play().unwrap();
    engine.device_mut().advance(1.0);
    engine.stop();
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(engine.device().active_voices(), 0);
}

#[test]
fn test_live_output_follows_mixer_settings() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let a = write_stem(dir.path(), "a.wav", 1.0, 0.5, 1);
    let b = write_stem(dir.path(), "b.wav", 1.0, 0.25, 1);
    engine.add_track("a", "A", &a).unwrap();
    engine.add_track("b", "B", &b).unwrap();
    engine.set_track_solo("b", true).unwrap();
    engine.set_master_volume(0.5);

    engine.play().unwrap();
    let out = engine.device_mut().render(16);

    // Centre-panned mono at 0.25, equal-power law, master 0.5
    let expected = 0.25 * std::f32::consts::FRAC_1_SQRT_2 * 0.5;
    assert_relative_eq!(out[0], expected, epsilon = 1e-3);
    assert_relative_eq!(out[1], expected, epsilon = 1e-3);
}

// === Export ===

#[test]
fn test_export_without_tracks_fails() {
    let mut engine = engine();
    engine.init().unwrap();
    let err = engine.export_to_wav().unwrap_err();
    assert_eq!(err.to_string(), "No tracks to export");
}

#[test]
fn test_export_header_and_length() {
    let dir = TempDir::new().unwrap();
    let mut engine = StemEngineBuilder::new().build(HeadlessDevice::new(44100), FileLoader);
    let frames = 4410;
    let buffer = AudioBuffer::from_channels(vec![vec![0.1; frames]; 2], 44100).unwrap();
    let path = dir.path().join("stereo.wav");
    write_wav_file(&buffer, &path).unwrap();
    engine
        .add_track("s", "Stereo", &path.display().to_string())
        .unwrap();

    let bytes = engine.export_to_wav().unwrap();
    assert_eq!(bytes.len(), 44 + frames * 4);
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);
    assert_eq!(&bytes[8..16], b"WAVEfmt ");
    assert_eq!(u16_at(&bytes, 20), 1);
    assert_eq!(u16_at(&bytes, 22), 2);
    assert_eq!(u32_at(&bytes, 24), 44100);
    assert_eq!(u32_at(&bytes, 28), 44100 * 4);
    assert_eq!(u16_at(&bytes, 32), 4);
    assert_eq!(u16_at(&bytes, 34), 16);
    assert_eq!(&bytes[36..40], b"data");
    assert_eq!(u32_at(&bytes, 40) as usize, frames * 4);
}

#[test]
fn test_export_matches_solo_and_mute() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let a = write_stem(dir.path(), "a.wav", 1.0, 0.5, 1);
    let b = write_stem(dir.path(), "b.wav", 1.0, 0.25, 1);
    engine.add_track("a", "A", &a).unwrap();
    engine.add_track("b", "B", &b).unwrap();

    engine.set_track_muted("a", true).unwrap();
    let decoded = decode_audio(engine.export_to_wav().unwrap(), Some("wav")).unwrap();
    assert_eq!(decoded.channels(), 1);
    assert_relative_eq!(decoded.channel(0)[100], 0.25, epsilon = 1e-3);

    engine.set_track_muted("a", false).unwrap();
    engine.set_track_solo("a", true).unwrap();
    let decoded = decode_audio(engine.export_to_wav().unwrap(), Some("wav")).unwrap();
    assert_relative_eq!(decoded.channel(0)[100], 0.5, epsilon = 1e-3);
}

#[test]
fn test_export_to_file_while_playing() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let a = write_stem(dir.path(), "a.wav", 1.0, 0.5, 2);
    engine.add_track("a", "A", &a).unwrap();
    engine.play().unwrap();
    engine.device_mut().advance(0.5);

    let out = dir.path().join("mix.wav");
    engine.export_to_wav_file(&out).unwrap();

    assert_eq!(engine.state(), EngineState::Playing);
    let reader = hound::WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), RATE);
}
