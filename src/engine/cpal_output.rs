//! Hardware output through cpal
//!
//! The stream callback locks the shared `Mixer`, renders a stereo block and
//! maps it onto the device's channels. The device clock is the number of
//! frames the callback has consumed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use log::{error, info};

use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{AudioDevice, VoiceHandle};
use crate::engine::mixer::{Mixer, Voice};
use crate::error::{Result, StemError};

fn device_error(e: impl std::fmt::Display) -> StemError {
    StemError::Device {
        reason: e.to_string(),
    }
}

/// The system's default output device
pub struct CpalDevice {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    mixer: Arc<Mutex<Mixer>>,
    frames_played: Arc<AtomicU64>,
    master_gain: f32,
}

impl CpalDevice {
    /// Find the default output device and its preferred configuration
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| device_error("no output device available"))?;
        let config = device.default_output_config().map_err(device_error)?.config();

        info!(
            "Output device: {} channels at {} Hz",
            config.channels, config.sample_rate.0
        );

        Ok(Self {
            device,
            config,
            stream: None,
            mixer: Arc::new(Mutex::new(Mixer::new(2))),
            frames_played: Arc::new(AtomicU64::new(0)),
            master_gain: 1.0,
        })
    }

    fn with_mixer<T>(&self, f: impl FnOnce(&mut Mixer) -> T) -> Option<T> {
        self.mixer.lock().ok().map(|mut mixer| f(&mut mixer))
    }
}

impl AudioDevice for CpalDevice {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device_channels = self.config.channels as usize;
        let mixer = Arc::clone(&self.mixer);
        let frames_played = Arc::clone(&self.frames_played);
        let mut scratch: Vec<f32> = Vec::with_capacity(2048);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / device_channels.max(1);
                    scratch.resize(frames * 2, 0.0);

                    match mixer.lock() {
                        Ok(mut mixer) => mixer.render(&mut scratch),
                        Err(_) => scratch.fill(0.0),
                    }

                    for (frame, stereo) in data
                        .chunks_mut(device_channels.max(1))
                        .zip(scratch.chunks_exact(2))
                    {
                        match frame.len() {
                            1 => frame[0] = 0.5 * (stereo[0] + stereo[1]),
                            _ => {
                                frame[0] = stereo[0];
                                frame[1] = stereo[1];
                                for sample in frame.iter_mut().skip(2) {
                                    *sample = 0.0;
                                }
                            }
                        }
                    }

                    frames_played.fetch_add(frames as u64, Ordering::Relaxed);
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(device_error)?;

        stream.play().map_err(device_error)?;
        self.stream = Some(stream);
        self.set_master_gain(self.master_gain);
        Ok(())
    }

    fn close(&mut self) {
        self.with_mixer(|mixer| mixer.clear());
        // Dropping the stream stops the callback
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn now(&self) -> f64 {
        self.frames_played.load(Ordering::Relaxed) as f64 / self.config.sample_rate.0 as f64
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain;
        self.with_mixer(|mixer| mixer.set_master_gain(gain));
    }

    fn start_voice(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset_secs: f64,
        gain: f32,
        pan: f32,
    ) -> Result<VoiceHandle> {
        if self.stream.is_none() {
            return Err(device_error("device is closed"));
        }
        self.with_mixer(|mixer| mixer.add_voice(Voice::new(buffer, offset_secs, gain, pan)))
            .ok_or_else(|| device_error("mixer lock poisoned"))
    }

    fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32) {
        self.with_mixer(|mixer| {
            if let Some(voice) = mixer.voice_mut(voice) {
                voice.set_gain(gain);
            }
        });
    }

    fn set_voice_pan(&mut self, voice: VoiceHandle, pan: f32) {
        self.with_mixer(|mixer| {
            if let Some(voice) = mixer.voice_mut(voice) {
                voice.set_pan(pan);
            }
        });
    }

    fn stop_voice(&mut self, voice: VoiceHandle) {
        self.with_mixer(|mixer| mixer.remove_voice(voice));
    }

    fn active_voices(&self) -> usize {
        self.with_mixer(|mixer| mixer.active_voices()).unwrap_or(0)
    }
}
