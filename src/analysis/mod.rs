//! Audio Analysis Module
//!
//! Tempo, key and loudness estimation over decoded buffers, pairwise
//! compatibility scoring, and waveform overviews. `TrackAnalyzer` is the
//! entry point for analysing sources by locator: it never fails, returning a
//! zero-confidence fallback when a source cannot be fetched or decoded.

pub mod beat;
pub mod cache;
pub mod compat;
pub mod key;
pub mod loudness;
pub mod waveform;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::loader::{load_audio, SourceLoader};
use crate::error::{Result, StemError};

pub use beat::{detect_bpm, BeatAnalysis};
pub use cache::AnalysisCache;
pub use compat::{
    check_compatibility, format_key, is_relative_key, tempo_category, CompatibilityResult,
    TempoCategory,
};
pub use key::{estimate_key, KeyAnalysis, Scale};
pub use loudness::estimate_loudness;
pub use waveform::{extract_peaks, WaveformData};

/// Duration reported by the fallback analysis
pub const FALLBACK_DURATION_SECS: f64 = 180.0;

/// Round to the nearest integer, halves towards positive infinity
///
/// ```
/// use stemmix::analysis::round_half_up;
/// assert_eq!(round_half_up(2.5), 3.0);
/// assert_eq!(round_half_up(-2.5), -2.0);
/// ```
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

// ============================================================================
// Track analysis
// ============================================================================

/// Everything known about one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAnalysis {
    pub bpm: BeatAnalysis,
    pub key: KeyAnalysis,
    /// Seconds
    pub duration: f64,
    /// Approximate LUFS
    pub loudness: f64,
}

impl TrackAnalysis {
    /// Returned when a source cannot be analysed
    pub fn fallback() -> Self {
        Self {
            bpm: BeatAnalysis::fallback(),
            key: KeyAnalysis::fallback(),
            duration: FALLBACK_DURATION_SECS,
            loudness: loudness::FALLBACK_LOUDNESS,
        }
    }

    /// Whether this is the fallback rather than a measurement
    pub fn is_fallback(&self) -> bool {
        self.bpm.confidence == 0.0 && self.key.confidence == 0.0
    }
}

/// Run tempo, key and loudness estimation on a decoded buffer
///
/// # Errors
/// * `EmptyAudio` - If the buffer holds no frames
pub fn analyze_buffer(buffer: &AudioBuffer) -> Result<TrackAnalysis> {
    if buffer.is_empty() {
        return Err(StemError::EmptyAudio);
    }
    Ok(TrackAnalysis {
        bpm: detect_bpm(buffer),
        key: estimate_key(buffer),
        duration: buffer.duration_secs(),
        loudness: estimate_loudness(buffer),
    })
}

// ============================================================================
// Analyzer
// ============================================================================

/// Analyses sources by locator and caches the results
pub struct TrackAnalyzer {
    loader: Box<dyn SourceLoader>,
    cache: AnalysisCache,
    config: AnalysisConfig,
}

impl TrackAnalyzer {
    pub fn new(loader: impl SourceLoader + 'static) -> Self {
        Self::with_config(loader, AnalysisConfig::default())
    }

    pub fn with_config(loader: impl SourceLoader + 'static, config: AnalysisConfig) -> Self {
        Self {
            loader: Box::new(loader),
            cache: AnalysisCache::new(),
            config,
        }
    }

    /// Fetch, decode and analyse `locator`
    ///
    /// Failures are logged and produce `TrackAnalysis::fallback()`, which is
    /// never cached.
    pub fn analyze_track(&mut self, locator: &str) -> TrackAnalysis {
        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get(locator) {
                debug!("Analysis cache hit for {}", locator);
                return cached.clone();
            }
        }

        match self.try_analyze_track(locator) {
            Ok(analysis) => {
                if self.config.cache_enabled {
                    self.cache.insert(locator, analysis.clone());
                }
                analysis
            }
            Err(e) => {
                warn!("Analysis of {} failed, using fallback: {}", locator, e);
                TrackAnalysis::fallback()
            }
        }
    }

    /// Like `analyze_track`, but surfaces the error and skips the cache
    pub fn try_analyze_track(&self, locator: &str) -> Result<TrackAnalysis> {
        let buffer = load_audio(self.loader.as_ref(), locator)?;
        analyze_buffer(&buffer)
    }

    /// Analyse several sources in order
    ///
    /// `on_progress(completed, total)` is called after each one.
    pub fn analyze_many<S: AsRef<str>>(
        &mut self,
        locators: &[S],
        mut on_progress: impl FnMut(usize, usize),
    ) -> Vec<TrackAnalysis> {
        let total = locators.len();
        locators
            .iter()
            .enumerate()
            .map(|(i, locator)| {
                let analysis = self.analyze_track(locator.as_ref());
                on_progress(i + 1, total);
                analysis
            })
            .collect()
    }

    /// Waveform overview of `locator` with `bars` peaks
    ///
    /// Cached per locator and bar count. Failures produce the synthetic
    /// fallback overview, which is not cached.
    pub fn analyze_waveform(&mut self, locator: &str, bars: usize) -> WaveformData {
        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get_waveform(locator, bars) {
                return cached.clone();
            }
        }

        match load_audio(self.loader.as_ref(), locator) {
            Ok(buffer) => {
                let data = WaveformData::from_buffer(&buffer, bars);
                if self.config.cache_enabled {
                    self.cache.insert_waveform(locator, bars, data.clone());
                }
                data
            }
            Err(e) => {
                warn!("Waveform of {} failed, using fallback: {}", locator, e);
                WaveformData::fallback(bars)
            }
        }
    }

    /// Waveform overview of a time window of `locator`; never cached
    pub fn analyze_waveform_segment(
        &self,
        locator: &str,
        start_secs: f64,
        duration_secs: f64,
        bars: usize,
    ) -> WaveformData {
        match load_audio(self.loader.as_ref(), locator) {
            Ok(buffer) => WaveformData::from_segment(&buffer, start_secs, duration_secs, bars),
            Err(e) => {
                warn!("Waveform segment of {} failed, using fallback: {}", locator, e);
                WaveformData::fallback(bars)
            }
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Forget every cached analysis and waveform
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
