//! Analysis Tests
//!
//! Analysis pipeline against synthetic audio written to disk.

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use test_case::test_case;

use stemmix::analysis::{
    analyze_buffer, check_compatibility, format_key, tempo_category, Scale, TempoCategory,
    TrackAnalysis, TrackAnalyzer, WaveformData,
};
use stemmix::engine::io::{generate_click_track, generate_test_tone};
use stemmix::engine::{export_clip, write_wav_file, FileLoader};

fn with_bpm(bpm: f64) -> TrackAnalysis {
    let mut analysis = TrackAnalysis::fallback();
    analysis.bpm.bpm = bpm;
    analysis
}

// === Track Analysis ===

#[test]
fn test_click_track_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clicks.wav");
    write_wav_file(&generate_click_track(0.5, 0.25, 8.0, 44100), &path).unwrap();

    let mut analyzer = TrackAnalyzer::new(FileLoader);
    let analysis = analyzer.analyze_track(&path.display().to_string());

    assert_eq!(analysis.bpm.bpm, 120.0);
    assert!(analysis.bpm.confidence > 0.75);
    assert_relative_eq!(analysis.bpm.offset, 0.25, epsilon = 0.01);
    assert_relative_eq!(analysis.duration, 8.0, epsilon = 1e-6);
    assert_eq!(analysis.key.confidence, 0.6);
    assert!(!analysis.is_fallback());
}

#[test]
fn test_unreadable_source_returns_fallback() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt.wav");
    std::fs::write(&path, "definitely not audio").unwrap();

    let mut analyzer = TrackAnalyzer::new(FileLoader);
    let analysis = analyzer.analyze_track(&path.display().to_string());
    assert_eq!(analysis, TrackAnalysis::fallback());
    assert!(analyzer.cache().is_empty());
}

#[test]
fn test_tone_loudness_and_serialisation() {
    let tone = generate_test_tone(441.0, 0.5, 3.0, 44100);
    let analysis = analyze_buffer(&tone).unwrap();

    // 0.5 peak sine: -9.03 dBFS RMS
    assert_relative_eq!(analysis.loudness, -23.0);

    let json = serde_json::to_value(&analysis).unwrap();
    assert!(json["bpm"]["beatPositions"].is_array());
    assert!(json["key"]["alternativeKey"].is_string());
    assert!(json["key"]["scale"] == "major" || json["key"]["scale"] == "minor");
}

// === Compatibility ===

#[test]
fn test_identical_tempo_and_key() {
    let result = check_compatibility(&with_bpm(128.0), &with_bpm(128.0));
    assert_eq!(result.score, 100);
    assert!(result.bpm_compatible);
    assert!(result.key_compatible);
    assert_eq!(result.recommended_pitch, 0.0);
}

#[test]
fn test_score_is_monotonic_in_tempo_gap() {
    let base = with_bpm(128.0);
    let near = check_compatibility(&base, &with_bpm(130.0));
    let far = check_compatibility(&base, &with_bpm(140.0));
    assert!(near.score >= far.score);
}

#[test]
fn test_relative_keys_score_85() {
    let mut a = with_bpm(128.0);
    let mut b = with_bpm(128.0);
    a.key.key = "D".to_string();
    b.key.key = "B".to_string();
    b.key.scale = Scale::Minor;

    let forward = check_compatibility(&a, &b);
    let backward = check_compatibility(&b, &a);
    assert_eq!(forward.score, 93);
    assert_eq!(forward.score, backward.score);
    assert_eq!(format_key(&b.key), "B minor");
}

#[test_case(60.0, TempoCategory::Slow ; "slow")]
#[test_case(100.0, TempoCategory::Medium ; "medium")]
#[test_case(128.0, TempoCategory::Fast ; "fast")]
#[test_case(174.0, TempoCategory::VeryFast ; "very fast")]
fn test_tempo_categories(bpm: f64, expected: TempoCategory) {
    assert_eq!(tempo_category(bpm), expected);
}

// === Waveforms and Clips ===

#[test]
fn test_waveform_cache_and_fallback() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav_file(&generate_test_tone(220.0, 0.8, 1.0, 8000), &path).unwrap();
    let locator = path.display().to_string();

    let mut analyzer = TrackAnalyzer::new(FileLoader);
    let data = analyzer.analyze_waveform(&locator, 20);
    assert_eq!(data.peaks.len(), 20);
    assert!(data.peaks.iter().all(|p| *p > 0.9));
    assert_eq!(data.sample_rate, 8000);
    assert_eq!(data.channels, 1);

    // Deleting the file does not matter once cached
    std::fs::remove_file(&path).unwrap();
    assert_eq!(analyzer.analyze_waveform(&locator, 20), data);
    assert_eq!(analyzer.analyze_waveform(&locator, 10), WaveformData::fallback(10));
}

#[test]
fn test_clip_round_trip() {
    let tone = generate_test_tone(220.0, 0.5, 4.0, 8000);
    let clip = export_clip(&tone, 1.2, 0.5, "Best Part").unwrap();

    assert_eq!(clip.file_name, "best-part-1s.wav");
    let reader = hound::WavReader::new(std::io::Cursor::new(clip.bytes)).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.duration(), 4000);
}
