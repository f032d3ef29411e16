//! Audio I/O for Stemmix
//!
//! Decoding of fetched byte streams (symphonia), linear sample rate
//! conversion, and the PCM16 WAV encoder used by every export path.
//!
//! All audio is held as 32-bit float internally. Sample rate conversion uses
//! linear interpolation.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::buffer::{AudioBuffer, ChannelLayout, MAX_CHANNELS};
use crate::error::{Result, StemError};

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

// ============================================================================
// Decoding
// ============================================================================

/// Decode an encoded audio stream into a planar buffer
///
/// # Arguments
/// * `bytes` - The complete encoded file (WAV, FLAC, MP3, OGG/Vorbis, AAC)
/// * `extension` - Optional file extension used as a probe hint
///
/// # Errors
/// * `DecodeFailed` - If the container or codec cannot be read
/// * `UnsupportedFormat` - If the audio has more than 2 channels
/// * `EmptyAudio` - If the stream decodes to zero frames
pub fn decode_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| StemError::DecodeFailed {
            reason: format!("Unrecognised audio container: {}", e),
            source: Some(Box::new(e)),
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| StemError::decode("no default audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| StemError::DecodeFailed {
            reason: format!("Unsupported codec: {}", e),
            source: Some(Box::new(e)),
        })?;

    let mut channels: Option<usize> = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut interleaved = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(StemError::DecodeFailed {
                    reason: format!("Failed to read packet: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => {
                return Err(StemError::DecodeFailed {
                    reason: format!("Failed to decode packet: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();

        // Channel count is locked on the first non-empty packet
        let locked = *channels.get_or_insert(packet_channels);
        if locked > MAX_CHANNELS {
            return Err(StemError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", locked),
            });
        }
        if packet_channels != locked {
            warn!(
                "Skipping packet with {} channels in a {}-channel stream",
                packet_channels, locked
            );
            continue;
        }
        sample_rate.get_or_insert(spec.rate);

        if sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity())
        {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let (channels, sample_rate) = match (channels, sample_rate) {
        (Some(channels), Some(rate)) if !interleaved.is_empty() => (channels, rate),
        _ => return Err(StemError::EmptyAudio),
    };

    debug!(
        "Decoded {} frames ({} Hz, {} ch)",
        interleaved.len() / channels,
        sample_rate,
        channels
    );

    AudioBuffer::from_interleaved(&interleaved, channels, sample_rate)
}

// ============================================================================
// Sample rate conversion
// ============================================================================

/// Resample a buffer to `target_rate`
///
/// Returns a clone when the rates already match.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate == target_rate || buffer.sample_rate == 0 {
        return buffer.clone();
    }

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    AudioBuffer {
        samples: buffer
            .samples
            .iter()
            .map(|channel| resample_linear(channel, ratio))
            .collect(),
        sample_rate: target_rate,
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// WAV encoding
// ============================================================================

/// How float samples map onto signed 16-bit integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmScaling {
    /// `round(s * 32767)` for both polarities (mix export)
    #[default]
    Symmetric,
    /// Negative samples scale by 32768, positive by 32767 (clip export)
    Asymmetric,
}

impl PcmScaling {
    /// Clamp to [-1, 1] and quantize
    #[inline]
    pub fn quantize(self, sample: f32) -> i16 {
        let clamped = (sample as f64).clamp(-1.0, 1.0);
        let scaled = match self {
            PcmScaling::Asymmetric if clamped < 0.0 => clamped * 32768.0,
            _ => clamped * 32767.0,
        };
        scaled.round() as i16
    }
}

/// Encode a buffer as a PCM16 little-endian RIFF/WAVE byte stream
///
/// The output is a 44-byte canonical header followed by
/// `frames * channels * 2` bytes of interleaved samples.
///
/// # Example
/// ```
/// use stemmix::engine::buffer::{AudioBuffer, ChannelLayout};
/// use stemmix::engine::io::encode_wav;
///
/// let buffer = AudioBuffer::new(10, ChannelLayout::Stereo, 44100);
/// let bytes = encode_wav(&buffer).unwrap();
/// assert_eq!(bytes.len(), 44 + 10 * 4);
/// ```
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    encode_wav_with(buffer, PcmScaling::Symmetric)
}

/// Encode a buffer as PCM16 WAV with an explicit quantization rule
pub fn encode_wav_with(buffer: &AudioBuffer, scaling: PcmScaling) -> Result<Vec<u8>> {
    let channels = buffer.channels();
    if ChannelLayout::from_count(channels).is_none() {
        return Err(StemError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        WAV_HEADER_LEN + buffer.len() * channels * 2,
    ));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for frame in 0..buffer.len() {
            for channel in &buffer.samples {
                writer.write_sample(scaling.quantize(channel[frame]))?;
            }
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Encode a buffer and write it to disk
pub fn write_wav_file(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    std::fs::write(path, encode_wav(buffer)?)?;
    Ok(())
}

// ============================================================================
// Test signal generators
// ============================================================================

/// Generate a mono sine tone
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `amplitude` - Peak amplitude (0-1)
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f64) as usize;
    let mut buffer = AudioBuffer::new(num_frames, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = amplitude * (angular_freq * i as f32).sin();
    }

    buffer
}

/// Generate a mono click track
///
/// Each click is an exponentially decaying burst starting at
/// `first_onset + k * interval_secs`.
pub fn generate_click_track(
    interval_secs: f64,
    first_onset: f64,
    duration_secs: f64,
    sample_rate: u32,
) -> AudioBuffer {
    const CLICK_LEN: usize = 1024;
    const DECAY: f32 = 100.0;

    let num_frames = (duration_secs * sample_rate as f64) as usize;
    let mut buffer = AudioBuffer::new(num_frames, ChannelLayout::Mono, sample_rate);
    let data = buffer.channel_mut(0);

    let mut onset = first_onset;
    while onset < duration_secs {
        let start = (onset * sample_rate as f64).round() as usize;
        for n in 0..CLICK_LEN {
            if let Some(sample) = data.get_mut(start + n) {
                *sample = (-(n as f32) / DECAY).exp();
            }
        }
        onset += interval_secs;
    }

    buffer
}

// ============================================================================
// Tests
// ============================================================================
