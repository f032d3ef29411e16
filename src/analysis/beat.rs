//! Onset-based tempo detection
//!
//! Energy is measured over 512-sample windows with a 256-sample hop on the
//! first channel. Local energy maxima above 30% of the loudest window are
//! onsets; the most common gap between consecutive onsets, to the nearest
//! 10 ms, is the beat interval.

use serde::{Deserialize, Serialize};

use crate::analysis::round_half_up;
use crate::engine::buffer::AudioBuffer;

/// Energy window length in samples
pub const WINDOW_SIZE: usize = 512;

/// Distance between successive windows in samples
pub const HOP_SIZE: usize = 256;

/// Normalised energy an onset must exceed
pub const ONSET_THRESHOLD: f32 = 0.3;

/// Tempo reported when no beat interval can be measured
pub const DEFAULT_BPM: f64 = 120.0;

/// Estimates are snapped to one of these if within `SNAP_TOLERANCE`
pub const COMMON_BPMS: [f64; 38] = [
    60.0, 65.0, 70.0, 72.0, 75.0, 80.0, 84.0, 85.0, 88.0, 90.0, 93.0, 95.0, 96.0, 100.0, 103.0,
    105.0, 110.0, 112.0, 115.0, 120.0, 123.0, 125.0, 126.0, 128.0, 130.0, 132.0, 135.0, 138.0,
    140.0, 142.0, 145.0, 150.0, 155.0, 160.0, 165.0, 170.0, 175.0, 180.0,
];

const SNAP_TOLERANCE: f64 = 5.0;

/// Tempo estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatAnalysis {
    pub bpm: f64,
    /// Share of onset gaps that agree with the chosen interval (0-1)
    pub confidence: f64,
    /// Estimated beat times in seconds
    pub beat_positions: Vec<f64>,
    /// Time of the first onset in seconds
    pub offset: f64,
}

impl BeatAnalysis {
    /// 120 BPM with zero confidence and no beats
    pub fn fallback() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            confidence: 0.0,
            beat_positions: Vec::new(),
            offset: 0.0,
        }
    }
}

/// Onset times in seconds for a single channel
pub fn detect_onsets(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let energies: Vec<f32> = (0..)
        .map(|frame| frame * HOP_SIZE)
        .take_while(|&start| start + WINDOW_SIZE < samples.len())
        .map(|start| {
            samples[start..start + WINDOW_SIZE]
                .iter()
                .map(|s| s * s)
                .sum::<f32>()
        })
        .collect();

    let max_energy = energies.iter().copied().fold(0.0_f32, f32::max).max(0.001);
    let normalized: Vec<f32> = energies.iter().map(|e| e / max_energy).collect();

    normalized
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > ONSET_THRESHOLD && w[1] > w[0] && w[1] > w[2])
        .map(|(i, _)| ((i + 1) * HOP_SIZE) as f64 / sample_rate as f64)
        .collect()
}

/// Most common onset gap in seconds and how many gaps share it
///
/// Gaps are grouped to the nearest 10 ms. Ties go to the gap seen first.
fn dominant_interval(onsets: &[f64]) -> Option<(f64, usize, usize)> {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    let mut total = 0;

    for pair in onsets.windows(2) {
        let key = round_half_up((pair[1] - pair[0]) * 100.0) as i64;
        total += 1;
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => counts.push((key, 1)),
        }
    }

    let mut best: Option<(i64, usize)> = None;
    for &(key, count) in &counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((key, count));
        }
    }
    best.map(|(key, count)| (key as f64 / 100.0, count, total))
}

/// Snap a tempo to the closest common value within 5 BPM
///
/// ```
/// use stemmix::analysis::beat::snap_to_common_bpm;
/// assert_eq!(snap_to_common_bpm(127.0), 128.0);
/// assert_eq!(snap_to_common_bpm(200.0), 200.0);
/// ```
pub fn snap_to_common_bpm(bpm: f64) -> f64 {
    let mut closest = COMMON_BPMS[0];
    for &candidate in &COMMON_BPMS[1..] {
        if (candidate - bpm).abs() < (closest - bpm).abs() {
            closest = candidate;
        }
    }
    if (closest - bpm).abs() < SNAP_TOLERANCE {
        closest
    } else {
        round_half_up(bpm)
    }
}

/// Estimate the tempo of a buffer
pub fn detect_bpm(buffer: &AudioBuffer) -> BeatAnalysis {
    if buffer.is_empty() {
        return BeatAnalysis::fallback();
    }

    let onsets = detect_onsets(buffer.channel(0), buffer.sample_rate);
    let Some((interval, count, total)) = dominant_interval(&onsets) else {
        return BeatAnalysis::fallback();
    };
    if interval <= 0.0 {
        return BeatAnalysis::fallback();
    }

    let bpm = round_half_up(60.0 / interval);
    let confidence = (count as f64 / total as f64).min(1.0);
    let offset = onsets[0];

    let mut beat_positions = vec![offset];
    if bpm > 0.0 {
        let beat = 60.0 / bpm;
        let duration = buffer.duration_secs();
        let mut t = offset + beat;
        while t < duration {
            beat_positions.push(t);
            t += beat;
        }
    }

    BeatAnalysis {
        bpm: snap_to_common_bpm(bpm),
        confidence,
        beat_positions,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::io::{generate_click_track, generate_test_tone};
    use approx::assert_relative_eq;
    use test_case::test_case;

    // ------------------------------------------------------------------------
    // Onsets
    // ------------------------------------------------------------------------

    #[test]
    fn test_onsets_on_hop_grid() {
        let clicks = generate_click_track(0.5, 0.25, 2.0, 25600);
        let onsets = detect_onsets(clicks.channel(0), 25600);
        assert_eq!(onsets.len(), 4);
        assert_relative_eq!(onsets[0], 0.25);
        assert_relative_eq!(onsets[3], 1.75);
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let silence = AudioBuffer::new(44100, ChannelLayout::Mono, 44100);
        assert!(detect_onsets(silence.channel(0), 44100).is_empty());
    }

    #[test]
    fn test_short_input_has_no_onsets() {
        assert!(detect_onsets(&[1.0; WINDOW_SIZE], 44100).is_empty());
    }

    // ------------------------------------------------------------------------
    // Tempo
    // ------------------------------------------------------------------------

    #[test]
    fn test_click_track_at_120() {
        let clicks = generate_click_track(0.5, 0.25, 10.0, 25600);
        let result = detect_bpm(&clicks);
        assert_eq!(result.bpm, 120.0);
        assert_relative_eq!(result.confidence, 1.0);
        assert_relative_eq!(result.offset, 0.25);
        assert_eq!(result.beat_positions.len(), 20);
        assert_relative_eq!(result.beat_positions[1], 0.75, epsilon = 1e-9);
    }

    #[test]
    fn test_click_track_at_cd_rate() {
        let clicks = generate_click_track(0.5, 0.25, 10.0, 44100);
        let result = detect_bpm(&clicks);
        assert_eq!(result.bpm, 120.0);
        assert!(result.confidence > 0.75, "confidence {}", result.confidence);
    }

    #[test]
    fn test_single_click_falls_back() {
        let click = generate_click_track(10.0, 0.5, 2.0, 44100);
        assert_eq!(detect_bpm(&click), BeatAnalysis::fallback());
    }

    #[test]
    fn test_silence_falls_back() {
        let silence = generate_test_tone(440.0, 0.0, 2.0, 44100);
        assert_eq!(detect_bpm(&silence), BeatAnalysis::fallback());
    }

    #[test]
    fn test_empty_buffer_falls_back() {
        assert_eq!(detect_bpm(&AudioBuffer::default()), BeatAnalysis::fallback());
    }

    // ------------------------------------------------------------------------
    // Snapping
    // ------------------------------------------------------------------------

    #[test_case(118.0, 120.0 ; "snaps up")]
    #[test_case(121.0, 120.0 ; "nearest entry")]
    #[test_case(57.0, 60.0 ; "below table")]
    #[test_case(184.0, 180.0 ; "above table within tolerance")]
    #[test_case(190.0, 190.0 ; "out of range")]
    #[test_case(129.0, 128.0 ; "first of equal distance wins")]
    fn test_snap(input: f64, expected: f64) {
        assert_eq!(snap_to_common_bpm(input), expected);
    }
}
