//! Stem Engine
//!
//! Orchestrates the track registry, the transport and an `AudioDevice`:
//! synchronized play/pause/seek/stop across all stems, per-track mixer
//! settings with solo/mute resolution, master volume, and offline export.
//!
//! All methods are called from one control thread. Notifications are
//! delivered synchronously through the callbacks given to the builder.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::device::AudioDevice;
use crate::engine::io::{resample, write_wav_file};
use crate::engine::loader::{load_audio, SourceLoader};
use crate::engine::registry::{StemTrack, TrackInfo, TrackRegistry};
use crate::engine::render::{export_mix, render_offline};
use crate::engine::transport::{EngineState, Transport};
use crate::error::Result;

/// Invoked on every state transition
pub type StateCallback = Box<dyn FnMut(EngineState)>;

/// Invoked with the playback position in seconds
pub type TimeCallback = Box<dyn FnMut(f64)>;

// ============================================================================
// Builder
// ============================================================================

/// Configures and constructs a `StemEngine`
#[derive(Default)]
pub struct StemEngineBuilder {
    config: EngineConfig,
    on_state_change: Option<StateCallback>,
    on_time_update: Option<TimeCallback>,
}

impl StemEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_state_change(mut self, callback: impl FnMut(EngineState) + 'static) -> Self {
        self.on_state_change = Some(Box::new(callback));
        self
    }

    pub fn on_time_update(mut self, callback: impl FnMut(f64) + 'static) -> Self {
        self.on_time_update = Some(Box::new(callback));
        self
    }

    /// Build an engine that plays through `device` and loads with `loader`
    ///
    /// The device is not opened until `init` (or the first `add_track`).
    pub fn build<D: AudioDevice>(
        self,
        device: D,
        loader: impl SourceLoader + 'static,
    ) -> StemEngine<D> {
        StemEngine {
            device,
            loader: Box::new(loader),
            registry: TrackRegistry::new(),
            transport: Transport::new(),
            master_volume: self.config.master_volume.clamp(0.0, 1.0),
            config: self.config,
            initialized: false,
            on_state_change: self.on_state_change,
            on_time_update: self.on_time_update,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Multi-stem playback engine
///
/// # Example
/// ```
/// use stemmix::engine::{EngineState, HeadlessDevice, MemoryLoader, StemEngineBuilder};
///
/// let mut engine =
///     StemEngineBuilder::new().build(HeadlessDevice::new(44100), MemoryLoader::new());
/// engine.init().unwrap();
/// assert_eq!(engine.state(), EngineState::Idle);
/// assert!(engine.export_to_wav().is_err());
/// ```
pub struct StemEngine<D: AudioDevice> {
    device: D,
    loader: Box<dyn SourceLoader>,
    registry: TrackRegistry,
    transport: Transport,
    config: EngineConfig,
    master_volume: f32,
    initialized: bool,
    on_state_change: Option<StateCallback>,
    on_time_update: Option<TimeCallback>,
}

impl<D: AudioDevice> StemEngine<D> {
    // ========================================================================
    // Notifications
    // ========================================================================

    fn set_state(&mut self, state: EngineState) {
        self.transport.set_state(state);
        if let Some(callback) = self.on_state_change.as_mut() {
            callback(state);
        }
    }

    fn emit_time(&mut self, secs: f64) {
        if let Some(callback) = self.on_time_update.as_mut() {
            callback(secs);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Acquire the device clock and master gain stage
    ///
    /// Idempotent. A device that fails to open puts the engine in `Error`.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if let Err(e) = self.device.open() {
            warn!("Audio device failed to open: {}", e);
            self.set_state(EngineState::Error);
            return Err(e);
        }
        self.device.set_master_gain(self.master_volume);
        self.initialized = true;
        info!(
            "Stem engine initialized at {} Hz",
            self.device.sample_rate()
        );
        self.set_state(EngineState::Idle);
        Ok(())
    }

    /// Release every live voice, clear the registry and close the device
    ///
    /// Safe to call in any state and any number of times.
    pub fn dispose(&mut self) {
        self.registry.clear(&mut self.device);
        self.transport.cancel_loop();
        if self.initialized {
            self.device.close();
            self.initialized = false;
            debug!("Stem engine disposed");
        }
        self.transport.reset();
        self.set_state(EngineState::Idle);
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// Fetch, decode and register a stem
    ///
    /// # Arguments
    /// * `id` - Caller-chosen identity; an existing track with the same id is replaced
    /// * `name` - Display name
    /// * `locator` - Path or URL of the encoded audio
    ///
    /// # Errors
    /// Fetch and decode failures put the engine in `Error` and are returned.
    /// The track is not registered in that case.
    pub fn add_track(&mut self, id: &str, name: &str, locator: &str) -> Result<()> {
        self.init()?;

        let was_playing = self.transport.is_playing();
        self.set_state(EngineState::Loading);

        let buffer = match load_audio(self.loader.as_ref(), locator) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Failed to load track '{}' from {}: {}", id, locator, e);
                if was_playing {
                    self.halt_session();
                }
                self.set_state(EngineState::Error);
                return Err(e);
            }
        };

        let device_rate = self.device.sample_rate();
        let buffer = if buffer.sample_rate != device_rate {
            debug!(
                "Resampling '{}' from {} Hz to {} Hz",
                id, buffer.sample_rate, device_rate
            );
            resample(&buffer, device_rate)
        } else {
            buffer
        };

        let track = StemTrack::new(id, name, locator, Arc::new(buffer));
        let duration = track.duration_secs();
        if self.registry.insert(track, &mut self.device).is_some() {
            debug!("Replaced existing track '{}'", id);
        }
        self.transport.extend_duration(duration);
        info!("Loaded track '{}' ({:.2}s)", name, duration);

        if was_playing {
            let position = self.transport.session_position(self.device.now());
            if let Err(e) = self.registry.start_one(id, &mut self.device, position) {
                self.halt_session();
                self.set_state(EngineState::Error);
                return Err(e);
            }
            self.set_state(EngineState::Playing);
        } else {
            self.set_state(EngineState::Ready);
        }
        Ok(())
    }

    /// Keep the position of an interrupted play session and release its voices
    fn halt_session(&mut self) {
        let position = self.transport.session_position(self.device.now());
        self.transport.seek(position);
        self.registry.release_all(&mut self.device);
        self.transport.cancel_loop();
    }

    /// Stop and drop a track
    ///
    /// The engine duration is left as it was.
    pub fn remove_track(&mut self, id: &str) -> Result<()> {
        self.registry.remove(id, &mut self.device)?;
        debug!("Removed track '{}'", id);
        Ok(())
    }

    /// Snapshots of every track in insertion order
    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.registry.infos()
    }

    pub fn track(&self, id: &str) -> Option<&StemTrack> {
        self.registry.get(id)
    }

    /// Resolved gain of a track under the current solo/mute settings
    pub fn effective_gain(&self, id: &str) -> Option<f32> {
        self.registry.effective_gain(id)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start every track at the paused offset
    ///
    /// No-op if already playing or not initialized.
    pub fn play(&mut self) -> Result<()> {
        if !self.initialized || self.transport.is_playing() {
            return Ok(());
        }

        let offset = self.transport.paused_offset();
        if let Err(e) = self.registry.start_all(&mut self.device, offset) {
            warn!("Failed to start playback: {}", e);
            self.set_state(EngineState::Error);
            return Err(e);
        }

        let now = self.device.now();
        let session = self.transport.play(now);
        debug!("Time loop {} started at {:.3}s", session, offset);
        self.set_state(EngineState::Playing);
        Ok(())
    }

    /// Capture the position and release every live voice
    ///
    /// No-op unless playing.
    pub fn pause(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        let now = self.device.now();
        self.transport.pause(now);
        self.registry.release_all(&mut self.device);
        self.transport.cancel_loop();
        self.set_state(EngineState::Ready);
    }

    /// Return to position 0 from any state
    pub fn stop(&mut self) {
        self.registry.release_all(&mut self.device);
        self.transport.cancel_loop();
        if self.initialized {
            self.transport.stop();
            self.set_state(EngineState::Ready);
        } else {
            self.transport.seek(0.0);
        }
        self.emit_time(0.0);
    }

    /// Move the playback position, clamped to `[0, duration]`
    ///
    /// While playing, every voice is restarted at the new position within
    /// this call and the time-update loop keeps running.
    pub fn seek(&mut self, secs: f64) -> Result<()> {
        if !self.transport.is_playing() {
            let position = self.transport.seek(secs);
            self.emit_time(position);
            return Ok(());
        }

        self.registry.release_all(&mut self.device);
        let position = self.transport.seek(secs);
        let now = self.device.now();
        self.transport.restart(now);
        if let Err(e) = self.registry.start_all(&mut self.device, position) {
            warn!("Failed to restart playback at {:.3}s: {}", position, e);
            self.transport.cancel_loop();
            self.set_state(EngineState::Error);
            return Err(e);
        }
        Ok(())
    }

    /// One iteration of the time-update loop
    ///
    /// Reports the current position and stops playback once the end is
    /// reached. Returns whether the loop should keep running; hosts call it
    /// once per `refresh_interval_ms` until it returns false.
    pub fn tick(&mut self) -> bool {
        if self.transport.loop_session().is_none() || !self.transport.is_playing() {
            return false;
        }
        let position = self.current_time();
        if position >= self.transport.duration() {
            debug!("Reached end at {:.3}s", position);
            self.stop();
            return false;
        }
        self.emit_time(position);
        true
    }

    pub fn state(&self) -> EngineState {
        self.transport.state()
    }

    pub fn current_time(&self) -> f64 {
        self.transport.current_time(self.device.now())
    }

    /// Length of the longest track loaded so far
    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // ========================================================================
    // Mixer
    // ========================================================================

    pub fn set_track_volume(&mut self, id: &str, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.registry.update_mix(id, |mix| mix.volume = volume)?;
        self.registry.apply_gains(&mut self.device);
        Ok(())
    }

    pub fn set_track_pan(&mut self, id: &str, pan: f32) -> Result<()> {
        let pan = pan.clamp(-1.0, 1.0);
        self.registry.update_mix(id, |mix| mix.pan = pan)?;
        self.registry.apply_pan(id, &mut self.device);
        Ok(())
    }

    pub fn set_track_muted(&mut self, id: &str, muted: bool) -> Result<()> {
        self.registry.update_mix(id, |mix| mix.muted = muted)?;
        self.registry.apply_gains(&mut self.device);
        Ok(())
    }

    /// Solo changes re-resolve the gain of every track, not just this one
    pub fn set_track_solo(&mut self, id: &str, solo: bool) -> Result<()> {
        self.registry.update_mix(id, |mix| mix.solo = solo)?;
        self.registry.apply_gains(&mut self.device);
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        if self.initialized {
            self.device.set_master_gain(self.master_volume);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Render the full mix from time 0 and encode it as PCM16 WAV
    ///
    /// Uses the same gain resolution as live playback. Independent of the
    /// live transport: the engine state is left untouched.
    ///
    /// # Errors
    /// * `NoTracks` - If no track is registered
    pub fn export_to_wav(&self) -> Result<Vec<u8>> {
        export_mix(
            &self.registry,
            self.transport.duration(),
            self.config.export_sample_rate,
        )
    }

    /// Render the full mix and write it to `path`
    pub fn export_to_wav_file(&self, path: &Path) -> Result<()> {
        let rendered = render_offline(
            &self.registry,
            self.transport.duration(),
            self.config.export_sample_rate,
        )?;
        write_wav_file(&rendered, path)?;
        info!("Exported mix to {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: AudioDevice> Drop for StemEngine<D> {
    fn drop(&mut self) {
        if self.initialized {
            self.registry.clear(&mut self.device);
            self.device.close();
        }
    }
}
