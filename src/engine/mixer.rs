//! Voice mixing
//!
//! One `Mixer` implementation backs every output path: the headless device,
//! the cpal device and offline export. Tracks reach it as `Voice`s, each a
//! playback cursor over a shared, immutable buffer with its own gain and pan.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;

// ============================================================================
// Gain resolution
// ============================================================================

/// Per-track mixer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixState {
    /// Linear volume (0-1)
    pub volume: f32,
    /// Stereo position (-1 left, 0 centre, 1 right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
        }
    }
}

impl MixState {
    /// Effective gain of this track given whether any track is soloed
    ///
    /// Muted tracks are silent. While anything is soloed, only soloed tracks
    /// are heard.
    #[inline]
    pub fn resolve_gain(&self, any_solo: bool) -> f32 {
        if self.muted || (any_solo && !self.solo) {
            0.0
        } else {
            self.volume
        }
    }
}

/// Whether any of the given tracks is soloed
pub fn any_solo<'a>(states: impl IntoIterator<Item = &'a MixState>) -> bool {
    states.into_iter().any(|state| state.solo)
}

// ============================================================================
// Stereo panner
// ============================================================================

/// Equal-power stereo panner
///
/// Mono sources are spread across both outputs. Stereo sources keep their
/// image at centre; panning folds the far channel into the near one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPanner {
    pan: f32,
    mono: (f32, f32),
    stereo: (f32, f32),
}

impl StereoPanner {
    pub fn new(pan: f32) -> Self {
        let mut panner = Self {
            pan: 0.0,
            mono: (0.0, 0.0),
            stereo: (0.0, 0.0),
        };
        panner.set_pan(pan);
        panner
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);

        let x = (self.pan + 1.0) * 0.5;
        self.mono = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());

        let x = if self.pan <= 0.0 { self.pan + 1.0 } else { self.pan };
        self.stereo = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
    }

    /// Pan a mono sample to (left, right)
    #[inline]
    pub fn process_mono(&self, input: f32) -> (f32, f32) {
        (input * self.mono.0, input * self.mono.1)
    }

    /// Pan a stereo frame
    #[inline]
    pub fn process_stereo(&self, left: f32, right: f32) -> (f32, f32) {
        let (g_l, g_r) = self.stereo;
        if self.pan <= 0.0 {
            (left + right * g_l, right * g_r)
        } else {
            (left * g_l, right + left * g_r)
        }
    }
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ============================================================================
// Voice
// ============================================================================

/// A playback cursor over a shared buffer
///
/// Voices never loop: once the cursor reaches the end of the buffer the voice
/// produces silence until it is removed.
#[derive(Debug, Clone)]
pub struct Voice {
    buffer: Arc<AudioBuffer>,
    position: usize,
    gain: f32,
    panner: StereoPanner,
}

impl Voice {
    /// Start a voice at `offset_secs`, clamped to the buffer's duration
    pub fn new(buffer: Arc<AudioBuffer>, offset_secs: f64, gain: f32, pan: f32) -> Self {
        let offset = offset_secs.clamp(0.0, buffer.duration_secs());
        let position = ((offset * buffer.sample_rate as f64).round() as usize).min(buffer.len());
        Self {
            buffer,
            position,
            gain,
            panner: StereoPanner::new(pan),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn pan(&self) -> f32 {
        self.panner.pan()
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.panner.set_pan(pan);
    }

    /// Current cursor in frames
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.buffer.len()
    }

    /// Add this voice's next frames into an interleaved output block
    ///
    /// The cursor advances by the number of frames in `out`.
    pub fn mix_into(&mut self, out: &mut [f32], out_channels: usize) {
        if out_channels == 0 {
            return;
        }
        let frames = out.len() / out_channels;
        let available = self.buffer.len().saturating_sub(self.position);
        let count = frames.min(available);

        if self.gain != 0.0 {
            let start = self.position;
            match (self.buffer.channels(), out_channels) {
                (1, 1) => {
                    let src = &self.buffer.channel(0)[start..start + count];
                    for (o, &s) in out.iter_mut().zip(src) {
                        *o += s * self.gain;
                    }
                }
                (2, 1) => {
                    let l = &self.buffer.channel(0)[start..start + count];
                    let r = &self.buffer.channel(1)[start..start + count];
                    for (i, o) in out.iter_mut().take(count).enumerate() {
                        *o += 0.5 * (l[i] + r[i]) * self.gain;
                    }
                }
                (1, _) => {
                    let src = &self.buffer.channel(0)[start..start + count];
                    for (frame, &s) in out.chunks_exact_mut(out_channels).zip(src) {
                        let (l, r) = self.panner.process_mono(s);
                        frame[0] += l * self.gain;
                        frame[1] += r * self.gain;
                    }
                }
                (2, _) => {
                    let l = &self.buffer.channel(0)[start..start + count];
                    let r = &self.buffer.channel(1)[start..start + count];
                    for (i, frame) in out.chunks_exact_mut(out_channels).take(count).enumerate() {
                        let (pl, pr) = self.panner.process_stereo(l[i], r[i]);
                        frame[0] += pl * self.gain;
                        frame[1] += pr * self.gain;
                    }
                }
                _ => {}
            }
        }

        self.position += count;
    }
}

// ============================================================================
// Mixer
// ============================================================================

/// Index of a voice inside a `Mixer`
///
/// The generation guards against a handle outliving its voice: once a slot
/// is reused, stale handles no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    voice: Option<Voice>,
}

/// Arena of active voices summed into one output bus
#[derive(Debug, Clone)]
pub struct Mixer {
    slots: Vec<Slot>,
    free: Vec<u32>,
    channels: usize,
    master_gain: f32,
}

impl Mixer {
    /// Create a mixer producing `channels` interleaved output channels (1 or 2)
    pub fn new(channels: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            channels: channels.clamp(1, 2),
            master_gain: 1.0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain;
    }

    pub fn add_voice(&mut self, voice: Voice) -> VoiceHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.voice = Some(voice);
            VoiceHandle {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                voice: Some(voice),
            });
            VoiceHandle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    pub fn voice(&self, handle: VoiceHandle) -> Option<&Voice> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.voice.as_ref())
    }

    pub fn voice_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.voice.as_mut())
    }

    /// Remove a voice; stale or unknown handles are ignored
    pub fn remove_voice(&mut self, handle: VoiceHandle) -> Option<Voice> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let voice = slot.voice.take()?;
        self.free.push(handle.index);
        Some(voice)
    }

    /// Remove every voice
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.voice.take().is_some() {
                self.free.push(index as u32);
            }
        }
    }

    /// Number of voices currently held (finished voices included)
    pub fn active_voices(&self) -> usize {
        self.slots.iter().filter(|slot| slot.voice.is_some()).count()
    }

    /// Overwrite `out` with the next block of the mix
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.channels;
        for voice in self.slots.iter_mut().filter_map(|slot| slot.voice.as_mut()) {
            voice.mix_into(out, channels);
        }
        if self.master_gain != 1.0 {
            for sample in out.iter_mut() {
                *sample *= self.master_gain;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
