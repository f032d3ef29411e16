//! Waveform overview peaks

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;

/// Peak data for drawing a waveform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformData {
    /// One normalised peak (0-1) per bar
    pub peaks: Vec<f32>,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

impl WaveformData {
    /// Whole-buffer overview
    pub fn from_buffer(buffer: &AudioBuffer, bars: usize) -> Self {
        Self {
            peaks: extract_peaks(buffer.channel(0), bars),
            duration: buffer.duration_secs(),
            sample_rate: buffer.sample_rate,
            channels: buffer.channels(),
        }
    }

    /// Overview of `duration_secs` starting at `start_secs`
    ///
    /// The reported duration is the requested one, even when the buffer ends
    /// earlier.
    pub fn from_segment(
        buffer: &AudioBuffer,
        start_secs: f64,
        duration_secs: f64,
        bars: usize,
    ) -> Self {
        let sample_rate = buffer.sample_rate as f64;
        let samples = buffer.channel(0);
        let start = ((start_secs * sample_rate).floor().max(0.0) as usize).min(samples.len());
        let len = (duration_secs * sample_rate).floor().max(0.0) as usize;
        let end = start.saturating_add(len).min(samples.len());

        Self {
            peaks: extract_peaks(&samples[start..end], bars),
            duration: duration_secs,
            sample_rate: buffer.sample_rate,
            channels: buffer.channels(),
        }
    }

    /// Synthetic overview for sources that cannot be decoded
    pub fn fallback(bars: usize) -> Self {
        let peaks = (0..bars)
            .map(|i| {
                let i = i as f64;
                let envelope = (i / bars as f64 * PI).sin();
                let detail = (i * 0.5).sin() * 0.3 + (i * 0.7).cos() * 0.2;
                let noise = (i * 2.3).sin() * 0.1;
                (envelope * 0.6 + detail + noise).clamp(0.1, 0.9) as f32
            })
            .collect();

        Self {
            peaks,
            duration: 180.0,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Max |sample| over `bars` equal slices, normalised to the loudest slice
///
/// Trailing samples that do not fill a whole slice are ignored.
pub fn extract_peaks(samples: &[f32], bars: usize) -> Vec<f32> {
    if bars == 0 {
        return Vec::new();
    }
    let per_bar = samples.len() / bars;

    let peaks: Vec<f32> = (0..bars)
        .map(|bar| {
            let start = bar * per_bar;
            samples[start..start + per_bar]
                .iter()
                .fold(0.0_f32, |max, s| max.max(s.abs()))
        })
        .collect();

    let max_peak = peaks.iter().copied().fold(0.001_f32, f32::max);
    peaks.into_iter().map(|p| p / max_peak).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peaks_are_normalised() {
        let samples = [0.1, -0.2, 0.4, -0.8, 0.0, 0.2, 0.9];
        let peaks = extract_peaks(&samples, 3);
        assert_eq!(peaks.len(), 3);
        assert_relative_eq!(peaks[0], 0.25);
        assert_relative_eq!(peaks[1], 1.0);
        assert_relative_eq!(peaks[2], 0.25);
    }

    #[test]
    fn test_more_bars_than_samples() {
        let peaks = extract_peaks(&[0.5, 0.5], 4);
        assert_eq!(peaks, vec![0.0; 4]);
        assert!(extract_peaks(&[0.5], 0).is_empty());
    }

    #[test]
    fn test_quiet_input_is_not_amplified_past_floor() {
        let peaks = extract_peaks(&[0.0005; 10], 2);
        assert_relative_eq!(peaks[0], 0.5);
    }

    #[test]
    fn test_from_buffer_uses_first_channel() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![0.5; 100], vec![1.0; 100]], 100).unwrap();
        let data = WaveformData::from_buffer(&buffer, 10);
        assert_eq!(data.peaks, vec![1.0; 10]);
        assert_eq!(data.channels, 2);
        assert_relative_eq!(data.duration, 1.0);
    }

    #[test]
    fn test_segment_window() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let buffer = AudioBuffer::from_channels(vec![samples], 10).unwrap();

        let data = WaveformData::from_segment(&buffer, 2.0, 2.0, 2);
        assert_relative_eq!(data.peaks[0], 0.29 / 0.39);
        assert_relative_eq!(data.peaks[1], 1.0);

        let past_end = WaveformData::from_segment(&buffer, 20.0, 5.0, 4);
        assert_eq!(past_end.peaks, vec![0.0; 4]);
        assert_eq!(past_end.duration, 5.0);
    }

    #[test]
    fn test_fallback_shape() {
        let data = WaveformData::fallback(100);
        assert_eq!(data.peaks.len(), 100);
        assert!(data.peaks.iter().all(|p| (0.1..=0.9).contains(p)));
        assert_eq!(data.duration, 180.0);
        assert_eq!(data.channels, 2);
    }
}
