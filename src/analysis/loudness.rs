//! Approximate loudness
//!
//! Mean-square energy of 4096-sample chunks of the first channel, averaged
//! and converted to dB with a fixed -14 offset. A rough LUFS proxy, not an
//! ITU-R BS.1770 measurement.

use crate::analysis::round_half_up;
use crate::engine::buffer::AudioBuffer;

pub const CHUNK_SIZE: usize = 4096;

/// Offset from dBFS RMS to the reported value
const CALIBRATION_DB: f64 = -14.0;

/// Reported for silent or empty input
pub const SILENCE_FLOOR: f64 = -70.0;

/// Loudness used when a track cannot be analysed
pub const FALLBACK_LOUDNESS: f64 = -14.0;

/// Approximate loudness of a buffer, rounded to 0.1
pub fn estimate_loudness(buffer: &AudioBuffer) -> f64 {
    if buffer.is_empty() {
        return SILENCE_FLOOR;
    }

    let samples = buffer.channel(0);
    let sum: f64 = samples
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let energy: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
            energy / CHUNK_SIZE as f64
        })
        .sum();

    let chunks = samples.len() as f64 / CHUNK_SIZE as f64;
    let rms = (sum / chunks).sqrt();
    let loudness = (20.0 * rms.log10() + CALIBRATION_DB).max(SILENCE_FLOOR);

    round_half_up(loudness * 10.0) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::io::generate_test_tone;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_scale_square() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0; CHUNK_SIZE * 4]], 44100).unwrap();
        assert_relative_eq!(estimate_loudness(&buffer), -14.0);
    }

    #[test]
    fn test_half_amplitude_is_six_db_down() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.5; CHUNK_SIZE * 4]], 44100).unwrap();
        assert_relative_eq!(estimate_loudness(&buffer), -20.0);
    }

    #[test]
    fn test_sine_rms() {
        // RMS of a full-scale sine is -3.01 dBFS
        let tone = generate_test_tone(441.0, 1.0, 2.0, 44100);
        assert_relative_eq!(estimate_loudness(&tone), -17.0);
    }

    #[test]
    fn test_partial_chunk_counts_fractionally() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.5; 1000]], 44100).unwrap();
        assert_relative_eq!(estimate_loudness(&buffer), -20.0);
    }

    #[test]
    fn test_silence_hits_floor() {
        let silence = AudioBuffer::new(10_000, ChannelLayout::Mono, 44100);
        assert_eq!(estimate_loudness(&silence), SILENCE_FLOOR);
        assert_eq!(estimate_loudness(&AudioBuffer::default()), SILENCE_FLOOR);
    }

    #[test]
    fn test_only_first_channel_is_measured() {
        let buffer = AudioBuffer::from_channels(
            vec![vec![0.5; CHUNK_SIZE], vec![1.0; CHUNK_SIZE]],
            44100,
        )
        .unwrap();
        assert_relative_eq!(estimate_loudness(&buffer), -20.0);
    }
}
