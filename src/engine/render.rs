//! Offline rendering
//!
//! Renders the registry to a buffer faster than real time, independently of
//! any live device, and encodes it as PCM16 WAV. Every track starts at time
//! zero regardless of the live playback position. Hook clips are cut from a
//! single decoded source.

use std::sync::Arc;

use log::info;

use crate::analysis::round_half_up;
use crate::engine::buffer::{AudioBuffer, MAX_CHANNELS};
use crate::engine::io::{encode_wav, encode_wav_with, resample, PcmScaling};
use crate::engine::mixer::{Mixer, Voice};
use crate::engine::registry::TrackRegistry;
use crate::error::{Result, StemError};

/// Frames rendered per mixer pass
const RENDER_BLOCK: usize = 4096;

// ============================================================================
// Mix export
// ============================================================================

/// Render every track of `registry` into one buffer
///
/// # Arguments
/// * `registry` - Tracks and their current mixer settings
/// * `duration_secs` - Length of the render; the engine passes its duration
/// * `sample_rate` - Output sample rate; tracks are resampled as needed
///
/// The output has as many channels as the widest track (at most two) and
/// `ceil(duration * sample_rate)` frames. Master volume is not applied.
///
/// # Errors
/// * `NoTracks` - If the registry is empty
pub fn render_offline(
    registry: &TrackRegistry,
    duration_secs: f64,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    if registry.is_empty() {
        return Err(StemError::NoTracks);
    }

    let channels = registry
        .iter()
        .map(|track| track.buffer().channels())
        .max()
        .unwrap_or(MAX_CHANNELS)
        .min(MAX_CHANNELS);
    let frames = (duration_secs * sample_rate as f64).ceil() as usize;

    let any_solo = registry.any_solo();
    let mut mixer = Mixer::new(channels);
    for track in registry.iter() {
        let buffer = if track.buffer().sample_rate == sample_rate {
            Arc::clone(track.buffer())
        } else {
            Arc::new(resample(track.buffer(), sample_rate))
        };
        mixer.add_voice(Voice::new(
            buffer,
            0.0,
            track.mix.resolve_gain(any_solo),
            track.mix.pan,
        ));
    }

    let mut interleaved = vec![0.0_f32; frames * channels];
    for block in interleaved.chunks_mut(RENDER_BLOCK * channels) {
        mixer.render(block);
    }

    AudioBuffer::from_interleaved(&interleaved, channels, sample_rate)
}

/// Render the registry and encode it as PCM16 WAV
pub fn export_mix(
    registry: &TrackRegistry,
    duration_secs: f64,
    sample_rate: u32,
) -> Result<Vec<u8>> {
    let rendered = render_offline(registry, duration_secs, sample_rate)?;
    info!(
        "Exported {} tracks: {:.2}s, {} ch at {} Hz",
        registry.len(),
        rendered.duration_secs(),
        rendered.channels(),
        sample_rate
    );
    encode_wav(&rendered)
}

// ============================================================================
// Hook clip export
// ============================================================================

/// A short excerpt ready to save or share
#[derive(Debug, Clone, PartialEq)]
pub struct ClipExport {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Cut `duration_secs` of audio starting at `start_secs` and encode it
///
/// The clip is at least one frame long and never reads before the start of
/// the source. Reads past the end come back as silence.
pub fn export_clip(
    source: &AudioBuffer,
    start_secs: f64,
    duration_secs: f64,
    file_name_base: &str,
) -> Result<ClipExport> {
    let sample_rate = source.sample_rate as f64;
    let start_frame = (start_secs * sample_rate).floor().max(0.0) as usize;
    let max_frames = (duration_secs * sample_rate).floor().max(0.0) as usize;
    let remaining = source.len().saturating_sub(start_frame).max(1);
    let frame_len = max_frames.min(remaining).max(1);

    let clip = source.slice_frames(start_frame, frame_len);
    let bytes = encode_wav_with(&clip, PcmScaling::Asymmetric)?;

    Ok(ClipExport {
        bytes,
        file_name: clip_file_name(file_name_base, start_secs),
    })
}

/// File name for a clip: a lower-case slug of `base` plus the start second
///
/// ```
/// use stemmix::engine::render::clip_file_name;
/// assert_eq!(clip_file_name("My Hook!", 12.6), "my-hook-13s.wav");
/// assert_eq!(clip_file_name("***", 0.0), "hook-0s.wav");
/// ```
pub fn clip_file_name(base: &str, start_secs: f64) -> String {
    let mut slug = String::with_capacity(base.len());
    for c in base.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "hook" } else { slug };

    format!("{}-{}s.wav", slug, round_half_up(start_secs))
}
