//! Key estimation
//!
//! A coarse heuristic, not pitch-class analysis. The first ten seconds of
//! the first channel are weighted with a falling ramp ("bass") and a rising
//! ramp ("treble"); a bass-heavy balance reads as minor, and the size of the
//! imbalance picks a name from a fixed list. Compatibility scoring is tuned
//! to exactly these names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;

pub const MAJOR_KEYS: [&str; 8] = ["C", "G", "D", "A", "E", "F", "B♭", "A♭"];
pub const MINOR_KEYS: [&str; 8] = ["Am", "Em", "Dm", "Gm", "Cm", "Bm", "F#m", "E♭m"];

/// Seconds of audio considered
const WINDOW_SECS: usize = 10;

/// Bass must exceed treble by this factor to read as minor
const MINOR_RATIO: f64 = 1.2;

const HEURISTIC_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Major,
    Minor,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Major => write!(f, "major"),
            Scale::Minor => write!(f, "minor"),
        }
    }
}

/// Key estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAnalysis {
    /// Root name without the minor suffix, e.g. `"A"` for A minor
    pub key: String,
    pub scale: Scale,
    pub confidence: f64,
    /// Nominal relative key from the opposite list
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alternative_key: Option<String>,
}

impl KeyAnalysis {
    /// C major with zero confidence
    pub fn fallback() -> Self {
        Self {
            key: "C".to_string(),
            scale: Scale::Major,
            confidence: 0.0,
            alternative_key: None,
        }
    }
}

/// Ramp-weighted energy of the analysis window: `(bass, treble)`
fn weighted_energy(buffer: &AudioBuffer) -> (f64, f64) {
    let window = buffer
        .len()
        .min(buffer.sample_rate as usize * WINDOW_SECS);
    if window == 0 {
        return (0.0, 0.0);
    }

    let samples = &buffer.channel(0)[..window];
    let mut bass = 0.0_f64;
    let mut treble = 0.0_f64;
    for (i, &sample) in samples.iter().enumerate() {
        let position = i as f64 / window as f64;
        let magnitude = sample.abs() as f64;
        bass += magnitude * (1.0 - position);
        treble += magnitude * position;
    }
    (bass, treble)
}

/// Estimate the key of a buffer
pub fn estimate_key(buffer: &AudioBuffer) -> KeyAnalysis {
    let (bass, treble) = weighted_energy(buffer);
    let scale = if bass > treble * MINOR_RATIO {
        Scale::Minor
    } else {
        Scale::Major
    };

    let index = ((bass - treble).abs() * 1000.0).floor() as u64 as usize % MAJOR_KEYS.len();
    let (name, alternative) = match scale {
        Scale::Major => (MAJOR_KEYS[index], MINOR_KEYS[index]),
        Scale::Minor => (MINOR_KEYS[index], MAJOR_KEYS[index]),
    };

    KeyAnalysis {
        key: name.replacen('m', "", 1),
        scale,
        confidence: HEURISTIC_CONFIDENCE,
        alternative_key: Some(alternative.to_string()),
    }
}
