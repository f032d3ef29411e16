//! Configuration for the engine and the analysis pipeline
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StemError};

// ============================================================================
// Defaults
// ============================================================================

/// Sample rate of the headless device when no hardware dictates one
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Sample rate of offline exports
pub const DEFAULT_EXPORT_SAMPLE_RATE: u32 = 44100;

/// Time-update loop period (roughly one display refresh at 60 Hz)
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 16;

/// Number of bars in a waveform overview
pub const DEFAULT_WAVEFORM_BARS: usize = 100;

// ============================================================================
// Engine configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate used by the headless device
    pub sample_rate: u32,
    /// Sample rate of `export_to_wav`
    pub export_sample_rate: u32,
    /// Initial master volume (0-1)
    pub master_volume: f32,
    /// How often hosts should call `StemEngine::tick`
    pub refresh_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            export_sample_rate: DEFAULT_EXPORT_SAMPLE_RATE,
            master_volume: 1.0,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Set the export sample rate
    pub fn with_export_sample_rate(mut self, sample_rate: u32) -> Self {
        self.export_sample_rate = sample_rate;
        self
    }

    /// Set the initial master volume
    pub fn with_master_volume(mut self, volume: f32) -> Self {
        self.master_volume = volume;
        self
    }
}

// ============================================================================
// Analysis configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Default number of waveform bars
    pub waveform_bars: usize,
    /// Whether analysis results are cached by source locator
    pub cache_enabled: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            waveform_bars: DEFAULT_WAVEFORM_BARS,
            cache_enabled: true,
        }
    }
}

// ============================================================================
// Top-level configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(StemError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.engine.sample_rate == 0 {
            return invalid("engine.sample_rate must be greater than zero");
        }
        if self.engine.export_sample_rate == 0 {
            return invalid("engine.export_sample_rate must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.engine.master_volume) {
            return invalid("engine.master_volume must be within [0, 1]");
        }
        if self.engine.refresh_interval_ms == 0 {
            return invalid("engine.refresh_interval_ms must be greater than zero");
        }
        if self.analysis.waveform_bars == 0 {
            return invalid("analysis.waveform_bars must be greater than zero");
        }
        Ok(())
    }
}
