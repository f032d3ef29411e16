//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use log::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::analysis::{
    check_compatibility, format_key, tempo_category, CompatibilityResult, TrackAnalysis,
    TrackAnalyzer,
};
use crate::config::Config;
use crate::engine::{
    export_clip, load_audio, DefaultLoader, HeadlessDevice, StemEngine, StemEngineBuilder,
};

/// File extensions picked up by `analyze-dir`
const AUDIO_EXTENSIONS: [&str; 7] = ["wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff"];

// ============================================================================
// Track specs
// ============================================================================

/// One `--track` argument of `mix`
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpec {
    pub name: String,
    pub source: String,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
}

/// Parse `NAME=SOURCE[:VOLUME[:PAN]]`
///
/// Trailing `:`-separated numbers are taken as volume and pan, so sources
/// that are URLs keep their scheme.
pub fn parse_track_spec(spec: &str) -> Result<TrackSpec, String> {
    let (name, rest) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SOURCE, got '{}'", spec))?;
    if name.is_empty() {
        return Err(format!("missing track name in '{}'", spec));
    }

    let mut source = rest;
    let mut numbers = Vec::new();
    while numbers.len() < 2 {
        match source.rsplit_once(':') {
            Some((head, tail)) => match tail.parse::<f32>() {
                Ok(value) => {
                    numbers.push(value);
                    source = head;
                }
                Err(_) => break,
            },
            None => break,
        }
    }
    if source.is_empty() {
        return Err(format!("missing source in '{}'", spec));
    }

    numbers.reverse();
    Ok(TrackSpec {
        name: name.to_string(),
        source: source.to_string(),
        volume: numbers.first().copied(),
        pan: numbers.get(1).copied(),
    })
}

// ============================================================================
// Analysis
// ============================================================================

fn print_analysis(source: &str, analysis: &TrackAnalysis) {
    println!("{}", source);
    if analysis.is_fallback() {
        println!("  (analysis failed, showing defaults)");
    }
    println!(
        "  Tempo:    {} BPM ({}, confidence {:.0}%)",
        analysis.bpm.bpm,
        tempo_category(analysis.bpm.bpm),
        analysis.bpm.confidence * 100.0
    );
    println!("  Key:      {}", format_key(&analysis.key));
    if let Some(alternative) = &analysis.key.alternative_key {
        println!("  Relative: {}", alternative);
    }
    println!("  Duration: {:.1}s", analysis.duration);
    println!("  Loudness: {:.1} LUFS", analysis.loudness);
}

fn print_results(sources: &[String], results: &[TrackAnalysis], json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<_> = sources
            .iter()
            .zip(results)
            .map(|(source, analysis)| serde_json::json!({ "source": source, "analysis": analysis }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (source, analysis) in sources.iter().zip(results) {
            print_analysis(source, analysis);
        }
    }
    Ok(())
}

/// Analyse one or more tracks.
pub fn analyze(sources: &[String], json: bool, config: &Config) -> anyhow::Result<()> {
    let mut analyzer = TrackAnalyzer::with_config(DefaultLoader::new(), config.analysis.clone());
    let results = analyzer.analyze_many(sources, |done, total| {
        info!("Analysed {}/{}", done, total);
    });
    print_results(sources, &results, json)
}

/// Analyse every audio file below a directory.
pub fn analyze_dir(dir: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let mut sources: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|entry| entry.path().display().to_string())
        .collect();
    sources.sort();

    if sources.is_empty() {
        println!("No audio files found in {}", dir.display());
        return Ok(());
    }

    info!("Found {} audio files in {}", sources.len(), dir.display());
    analyze(&sources, json, config)
}

fn print_compatibility(result: &CompatibilityResult) {
    let verdict = |ok: bool| if ok { "yes" } else { "no" };
    println!("Score:          {}/100", result.score);
    println!(
        "Tempo match:    {} (diff {:.1} BPM)",
        verdict(result.bpm_compatible),
        result.bpm_diff
    );
    println!("Key match:      {}", verdict(result.key_compatible));
    if result.recommended_pitch != 0.0 {
        println!("Suggested pitch: {:+.1}%", result.recommended_pitch);
    }
}

/// Score how well two tracks blend.
pub fn compat(first: &str, second: &str, json: bool, config: &Config) -> anyhow::Result<()> {
    let mut analyzer = TrackAnalyzer::with_config(DefaultLoader::new(), config.analysis.clone());
    let a = analyzer.analyze_track(first);
    let b = analyzer.analyze_track(second);
    let result = check_compatibility(&a, &b);

    if json {
        let report = serde_json::json!({ "first": a, "second": b, "compatibility": result });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_analysis(first, &a);
        print_analysis(second, &b);
        println!();
        print_compatibility(&result);
    }
    Ok(())
}

/// Print waveform peaks.
pub fn waveform(source: &str, bars: Option<usize>, config: &Config) -> anyhow::Result<()> {
    let bars = bars.unwrap_or(config.analysis.waveform_bars);
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    let mut analyzer = TrackAnalyzer::with_config(DefaultLoader::new(), config.analysis.clone());
    let data = analyzer.analyze_waveform(source, bars);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

// ============================================================================
// Engine
// ============================================================================

/// Load `specs` into an engine, returning the id assigned to each name
fn load_tracks<D: crate::engine::AudioDevice>(
    engine: &mut StemEngine<D>,
    specs: &[TrackSpec],
) -> anyhow::Result<Vec<(String, String)>> {
    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = Uuid::new_v4().to_string();
        engine
            .add_track(&id, &spec.name, &spec.source)
            .with_context(|| format!("Failed to load '{}' from {}", spec.name, spec.source))?;
        if let Some(volume) = spec.volume {
            engine.set_track_volume(&id, volume)?;
        }
        if let Some(pan) = spec.pan {
            engine.set_track_pan(&id, pan)?;
        }
        ids.push((spec.name.clone(), id));
    }
    Ok(ids)
}

fn id_for<'a>(ids: &'a [(String, String)], name: &str) -> anyhow::Result<&'a str> {
    ids.iter()
        .find(|(track_name, _)| track_name == name)
        .map(|(_, id)| id.as_str())
        .with_context(|| format!("No track named '{}'", name))
}

/// Mix stems offline and write the result.
pub fn mix(
    specs: &[TrackSpec],
    solo: &[String],
    mute: &[String],
    out: &Path,
    config: &Config,
) -> anyhow::Result<()> {
    let mut engine = StemEngineBuilder::new()
        .config(config.engine.clone())
        .build(HeadlessDevice::new(config.engine.sample_rate), DefaultLoader::new());

    let ids = load_tracks(&mut engine, specs)?;
    for name in solo {
        engine.set_track_solo(id_for(&ids, name)?, true)?;
    }
    for name in mute {
        engine.set_track_muted(id_for(&ids, name)?, true)?;
    }

    for track in engine.tracks() {
        println!(
            "  {:<16} vol {:.2}  pan {:+.2}  gain {:.2}",
            track.name, track.volume, track.pan, track.effective_gain
        );
    }

    engine.export_to_wav_file(out)?;
    println!(
        "Mixed {} tracks ({:.1}s) to {}",
        ids.len(),
        engine.duration(),
        out.display()
    );
    engine.dispose();
    Ok(())
}

/// Cut a hook clip and write it next to the other clips.
pub fn clip(
    source: &str,
    start: f64,
    duration: f64,
    name: Option<&str>,
    out_dir: &Path,
) -> anyhow::Result<()> {
    if duration <= 0.0 {
        bail!("--duration must be positive");
    }

    let buffer = load_audio(&DefaultLoader::new(), source)?;
    let base = name.map(str::to_string).unwrap_or_else(|| {
        Path::new(source.split(['?', '#']).next().unwrap_or(source))
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("hook")
            .to_string()
    });

    let clip = export_clip(&buffer, start, duration, &base)?;
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(&clip.file_name);
    fs::write(&path, &clip.bytes)?;

    println!("Clip written: {} ({} bytes)", path.display(), clip.bytes.len());
    Ok(())
}

/// Play stems in sync until the longest one ends.
#[cfg(feature = "device-output")]
pub fn play(sources: &[String], config: &Config) -> anyhow::Result<()> {
    use std::io::Write;
    use std::time::Duration;

    use crate::engine::CpalDevice;

    let device = CpalDevice::new()?;
    let mut engine = StemEngineBuilder::new()
        .config(config.engine.clone())
        .on_state_change(|state| info!("Engine {}", state))
        .on_time_update(|secs| {
            print!("\r{:>7.1}s", secs);
            let _ = std::io::stdout().flush();
        })
        .build(device, DefaultLoader::new());

    let specs: Vec<TrackSpec> = sources
        .iter()
        .map(|source| TrackSpec {
            name: source.clone(),
            source: source.clone(),
            volume: None,
            pan: None,
        })
        .collect();
    load_tracks(&mut engine, &specs)?;

    println!("Playing {} stems ({:.1}s)", specs.len(), engine.duration());
    engine.play()?;

    let interval = Duration::from_millis(config.engine.refresh_interval_ms.max(1));
    while engine.tick() {
        std::thread::sleep(interval);
    }
    println!();
    engine.dispose();
    Ok(())
}

/// Play stems in sync until the longest one ends.
#[cfg(not(feature = "device-output"))]
pub fn play(_sources: &[String], _config: &Config) -> anyhow::Result<()> {
    bail!("Audio output is not available. Build with --features device-output")
}
