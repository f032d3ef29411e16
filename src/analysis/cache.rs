//! Analysis cache
//!
//! Results keyed by source locator, owned by a `TrackAnalyzer` rather than
//! living in global state. Nothing is persisted; `clear` empties it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::analysis::waveform::WaveformData;
use crate::analysis::TrackAnalysis;

#[derive(Debug, Clone)]
struct CachedAnalysis {
    analysis: TrackAnalysis,
    analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisCache {
    tracks: HashMap<String, CachedAnalysis>,
    waveforms: HashMap<(String, usize), WaveformData>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &str) -> Option<&TrackAnalysis> {
        self.tracks.get(locator).map(|entry| &entry.analysis)
    }

    /// When the cached analysis of `locator` was computed
    pub fn analyzed_at(&self, locator: &str) -> Option<DateTime<Utc>> {
        self.tracks.get(locator).map(|entry| entry.analyzed_at)
    }

    pub fn insert(&mut self, locator: impl Into<String>, analysis: TrackAnalysis) {
        self.tracks.insert(
            locator.into(),
            CachedAnalysis {
                analysis,
                analyzed_at: Utc::now(),
            },
        );
    }

    pub fn get_waveform(&self, locator: &str, bars: usize) -> Option<&WaveformData> {
        self.waveforms.get(&(locator.to_string(), bars))
    }

    pub fn insert_waveform(&mut self, locator: impl Into<String>, bars: usize, data: WaveformData) {
        self.waveforms.insert((locator.into(), bars), data);
    }

    /// Number of cached track analyses
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn waveform_count(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.waveforms.is_empty()
    }

    /// Drop every cached analysis and waveform
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.waveforms.clear();
    }

    pub fn clear_waveforms(&mut self) {
        self.waveforms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clear() {
        let mut cache = AnalysisCache::new();
        assert!(cache.is_empty());

        let before = Utc::now();
        cache.insert("a.wav", TrackAnalysis::fallback());
        cache.insert_waveform("a.wav", 50, WaveformData::fallback(50));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.waveform_count(), 1);
        assert!(cache.get("a.wav").is_some());
        assert!(cache.get_waveform("a.wav", 50).is_some());
        assert!(cache.get_waveform("a.wav", 100).is_none());
        assert!(cache.analyzed_at("a.wav").is_some_and(|t| t >= before));

        cache.clear_waveforms();
        assert_eq!(cache.waveform_count(), 0);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a.wav").is_none());
    }
}
