//! Audio device abstraction
//!
//! The engine never talks to a platform audio API directly. It asks an
//! `AudioDevice` for a clock and for voices; the device owns the mixing bus.
//! `HeadlessDevice` is the in-process implementation used by tests and by
//! offline hosts. `CpalDevice` (feature `device-output`) drives real hardware.

use std::sync::Arc;

use log::debug;

use crate::engine::buffer::AudioBuffer;
use crate::engine::mixer::{Mixer, Voice};
use crate::error::{Result, StemError};

pub use crate::engine::mixer::VoiceHandle;

/// Output device owned by a `StemEngine`
pub trait AudioDevice {
    /// Acquire the device clock and output bus
    fn open(&mut self) -> Result<()>;

    /// Release the device; all voices are dropped
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Device clock in seconds
    fn now(&self) -> f64;

    /// Sample rate voices must be delivered at
    fn sample_rate(&self) -> u32;

    fn set_master_gain(&mut self, gain: f32);

    /// Start playing `buffer` from `offset_secs` immediately
    fn start_voice(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset_secs: f64,
        gain: f32,
        pan: f32,
    ) -> Result<VoiceHandle>;

    fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32);

    fn set_voice_pan(&mut self, voice: VoiceHandle, pan: f32);

    /// Stop and release a voice; unknown handles are ignored
    fn stop_voice(&mut self, voice: VoiceHandle);

    /// Number of live voices
    fn active_voices(&self) -> usize;
}

// ============================================================================
// Headless device
// ============================================================================

/// Stereo device with a manually driven clock
///
/// Time only moves when the host calls `advance` or `render`; both pull the
/// same amount of audio through the mixer, so voice cursors and the clock
/// never drift apart.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    sample_rate: u32,
    open: bool,
    frames_rendered: u64,
    mixer: Mixer,
    voices_started: usize,
}

impl HeadlessDevice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            open: false,
            frames_rendered: 0,
            mixer: Mixer::new(2),
            voices_started: 0,
        }
    }

    /// Pull `frames` frames of interleaved stereo output
    ///
    /// A closed device renders silence and its clock stays put.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; frames * self.mixer.channels()];
        if self.open {
            self.mixer.render(&mut out);
            self.frames_rendered += frames as u64;
        }
        out
    }

    /// Advance the clock by `secs`, discarding the rendered audio
    pub fn advance(&mut self, secs: f64) {
        const BLOCK: usize = 4096;

        let mut remaining = (secs.max(0.0) * self.sample_rate as f64).round() as usize;
        while remaining > 0 {
            let frames = remaining.min(BLOCK);
            self.render(frames);
            remaining -= frames;
        }
    }

    /// Total voices started since creation
    pub fn voices_started(&self) -> usize {
        self.voices_started
    }

    /// Read-only view of the output bus
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SAMPLE_RATE)
    }
}

impl AudioDevice for HeadlessDevice {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        debug!("Headless device opened at {} Hz", self.sample_rate);
        Ok(())
    }

    fn close(&mut self) {
        self.mixer.clear();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.mixer.set_master_gain(gain);
    }

    fn start_voice(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset_secs: f64,
        gain: f32,
        pan: f32,
    ) -> Result<VoiceHandle> {
        if !self.open {
            return Err(StemError::Device {
                reason: "device is closed".to_string(),
            });
        }
        self.voices_started += 1;
        Ok(self
            .mixer
            .add_voice(Voice::new(buffer, offset_secs, gain, pan)))
    }

    fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32) {
        if let Some(voice) = self.mixer.voice_mut(voice) {
            voice.set_gain(gain);
        }
    }

    fn set_voice_pan(&mut self, voice: VoiceHandle, pan: f32) {
        if let Some(voice) = self.mixer.voice_mut(voice) {
            voice.set_pan(pan);
        }
    }

    fn stop_voice(&mut self, voice: VoiceHandle) {
        self.mixer.remove_voice(voice);
    }

    fn active_voices(&self) -> usize {
        self.mixer.active_voices()
    }
}
