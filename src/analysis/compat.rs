//! Blend compatibility between two analysed tracks

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::key::{KeyAnalysis, Scale};
use crate::analysis::{round_half_up, TrackAnalysis};

/// Major keys and their relative minors
pub const RELATIVE_KEYS: [(&str, &str); 12] = [
    ("C", "Am"),
    ("G", "Em"),
    ("D", "Bm"),
    ("A", "F#m"),
    ("E", "C#m"),
    ("B", "G#m"),
    ("F#", "D#m"),
    ("F", "Dm"),
    ("Bb", "Gm"),
    ("Eb", "Cm"),
    ("Ab", "Fm"),
    ("Db", "Bbm"),
];

/// How well two tracks mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResult {
    /// Overall score (0-100)
    pub score: u32,
    pub bpm_compatible: bool,
    pub key_compatible: bool,
    pub bpm_diff: f64,
    /// Suggested pitch change in percent; 0 when the tempos already fit
    pub recommended_pitch: f64,
}

/// Score tempo agreement, including half and double time
fn bpm_score(bpm1: f64, bpm2: f64) -> (f64, bool) {
    let diff = (bpm1 - bpm2).abs();
    let ratio = bpm1 / bpm2;

    if diff <= 3.0 {
        (100.0, true)
    } else if diff <= 6.0 {
        (80.0, true)
    } else if (ratio - 0.5).abs() < 0.05 || (ratio - 2.0).abs() < 0.1 {
        (70.0, true)
    } else if diff <= 10.0 {
        (50.0, false)
    } else {
        ((100.0 - diff * 2.0).max(0.0), false)
    }
}

/// Score key agreement
fn key_score(a: &KeyAnalysis, b: &KeyAnalysis) -> (f64, bool) {
    if a.key == b.key && a.scale == b.scale {
        (100.0, true)
    } else if a.key == b.key {
        (70.0, true)
    } else if is_relative_key(a, b) {
        (85.0, true)
    } else {
        (50.0, false)
    }
}

/// Normalise accidentals to the ASCII spelling used by `RELATIVE_KEYS`
fn ascii_accidentals(name: &str) -> String {
    name.replace('♭', "b").replace('♯', "#")
}

/// Whether one key is the relative major or minor of the other
///
/// Symmetric in its arguments.
pub fn is_relative_key(a: &KeyAnalysis, b: &KeyAnalysis) -> bool {
    let (major, minor) = match (a.scale, b.scale) {
        (Scale::Major, Scale::Minor) => (a, b),
        (Scale::Minor, Scale::Major) => (b, a),
        _ => return false,
    };
    let major_name = ascii_accidentals(&major.key);
    let minor_name = format!("{}m", ascii_accidentals(&minor.key));

    RELATIVE_KEYS
        .iter()
        .any(|&(maj, min)| maj == major_name && min == minor_name)
}

/// Compare two analyses for mixing
///
/// # Example
/// ```
/// use stemmix::analysis::{check_compatibility, TrackAnalysis};
///
/// let mut a = TrackAnalysis::fallback();
/// a.bpm.bpm = 128.0;
/// let b = a.clone();
/// let result = check_compatibility(&a, &b);
/// assert_eq!(result.score, 100);
/// assert_eq!(result.recommended_pitch, 0.0);
/// ```
pub fn check_compatibility(a: &TrackAnalysis, b: &TrackAnalysis) -> CompatibilityResult {
    let bpm1 = a.bpm.bpm;
    let bpm2 = b.bpm.bpm;

    let (bpm_points, bpm_compatible) = bpm_score(bpm1, bpm2);
    let (key_points, key_compatible) = key_score(&a.key, &b.key);

    let recommended_pitch = if bpm_compatible {
        0.0
    } else {
        round_half_up((bpm2 - bpm1) * 10.0) / 10.0
    };

    CompatibilityResult {
        score: round_half_up((bpm_points + key_points) / 2.0) as u32,
        bpm_compatible,
        key_compatible,
        bpm_diff: (bpm1 - bpm2).abs(),
        recommended_pitch,
    }
}

/// Coarse tempo band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoCategory {
    #[serde(rename = "slow")]
    Slow,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "fast")]
    Fast,
    #[serde(rename = "very fast")]
    VeryFast,
}

impl fmt::Display for TempoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempoCategory::Slow => write!(f, "slow"),
            TempoCategory::Medium => write!(f, "medium"),
            TempoCategory::Fast => write!(f, "fast"),
            TempoCategory::VeryFast => write!(f, "very fast"),
        }
    }
}

pub fn tempo_category(bpm: f64) -> TempoCategory {
    if bpm < 80.0 {
        TempoCategory::Slow
    } else if bpm < 120.0 {
        TempoCategory::Medium
    } else if bpm < 150.0 {
        TempoCategory::Fast
    } else {
        TempoCategory::VeryFast
    }
}

/// Display form of a key, e.g. `"A minor"`
pub fn format_key(key: &KeyAnalysis) -> String {
    format!("{} {}", key.key, key.scale)
}
