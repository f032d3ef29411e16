//! Track registry
//!
//! Owns every loaded stem: its decoded buffer (immutable once loaded) and,
//! only while the engine is playing, the voice it is sounding through.
//! Tracks live in an arena of slots addressed through an id index, so
//! releasing every live voice is one pass over the arena.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{AudioDevice, VoiceHandle};
use crate::engine::mixer::MixState;
use crate::error::{Result, StemError};

/// One loaded stem
#[derive(Debug, Clone)]
pub struct StemTrack {
    pub id: String,
    pub name: String,
    /// Locator the audio was loaded from
    pub source: String,
    buffer: Arc<AudioBuffer>,
    pub mix: MixState,
    voice: Option<VoiceHandle>,
}

impl StemTrack {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
        buffer: Arc<AudioBuffer>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: source.into(),
            buffer,
            mix: MixState::default(),
            voice: None,
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }

    /// Whether the track currently holds a live voice
    pub fn is_live(&self) -> bool {
        self.voice.is_some()
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.voice
    }

    fn release(&mut self, device: &mut dyn AudioDevice) {
        if let Some(voice) = self.voice.take() {
            device.stop_voice(voice);
        }
    }
}

/// Snapshot of a track for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub source: String,
    pub duration: f64,
    pub channels: usize,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub effective_gain: f32,
    pub live: bool,
}

/// Arena of tracks with an id index
#[derive(Debug, Default)]
pub struct TrackRegistry {
    slots: Vec<Option<StemTrack>>,
    index: HashMap<String, usize>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Tracks in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &StemTrack> {
        self.slots.iter().flatten()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&StemTrack> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots[slot].as_ref())
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut StemTrack> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots[slot].as_mut())
            .ok_or_else(|| StemError::TrackNotFound { id: id.to_string() })
    }

    /// Register a track
    ///
    /// A track with the same id is replaced in place (keeping its position);
    /// its live voice is released first and the old track is returned.
    pub fn insert(&mut self, track: StemTrack, device: &mut dyn AudioDevice) -> Option<StemTrack> {
        match self.index.get(&track.id) {
            Some(&slot) => {
                let mut old = self.slots[slot].replace(track);
                if let Some(old) = old.as_mut() {
                    old.release(device);
                }
                old
            }
            None => {
                self.index.insert(track.id.clone(), self.slots.len());
                self.slots.push(Some(track));
                None
            }
        }
    }

    /// Remove a track, releasing its live voice before the buffer is dropped
    pub fn remove(&mut self, id: &str, device: &mut dyn AudioDevice) -> Result<StemTrack> {
        let slot = self
            .index
            .remove(id)
            .ok_or_else(|| StemError::TrackNotFound { id: id.to_string() })?;
        let mut track = self.slots[slot]
            .take()
            .ok_or_else(|| StemError::TrackNotFound { id: id.to_string() })?;
        track.release(device);
        Ok(track)
    }

    /// Release every live voice and drop all tracks
    pub fn clear(&mut self, device: &mut dyn AudioDevice) {
        self.release_all(device);
        self.slots.clear();
        self.index.clear();
    }

    /// Longest track duration in seconds
    pub fn max_duration(&self) -> f64 {
        self.iter().map(StemTrack::duration_secs).fold(0.0, f64::max)
    }

    pub fn any_solo(&self) -> bool {
        self.iter().any(|track| track.mix.solo)
    }

    /// Resolved gain of one track under the current solo state
    pub fn effective_gain(&self, id: &str) -> Option<f32> {
        let any_solo = self.any_solo();
        self.get(id).map(|track| track.mix.resolve_gain(any_solo))
    }

    /// Mutate a track's mixer settings
    pub fn update_mix(&mut self, id: &str, f: impl FnOnce(&mut MixState)) -> Result<()> {
        f(&mut self.get_mut(id)?.mix);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Live voices
    // ------------------------------------------------------------------------

    /// Start a voice for every track at `offset_secs`
    ///
    /// Each track's offset is clamped to its own duration. On failure every
    /// voice started so far is released again.
    pub fn start_all(&mut self, device: &mut dyn AudioDevice, offset_secs: f64) -> Result<()> {
        let any_solo = self.any_solo();
        for slot in 0..self.slots.len() {
            if let Err(e) = self.start_slot(slot, device, offset_secs, any_solo) {
                self.release_all(device);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Start a voice for a single track
    pub fn start_one(
        &mut self,
        id: &str,
        device: &mut dyn AudioDevice,
        offset_secs: f64,
    ) -> Result<()> {
        let any_solo = self.any_solo();
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| StemError::TrackNotFound { id: id.to_string() })?;
        self.start_slot(slot, device, offset_secs, any_solo)
    }

    fn start_slot(
        &mut self,
        slot: usize,
        device: &mut dyn AudioDevice,
        offset_secs: f64,
        any_solo: bool,
    ) -> Result<()> {
        let Some(track) = self.slots[slot].as_mut() else {
            return Ok(());
        };
        track.release(device);
        let offset = offset_secs.min(track.duration_secs());
        let voice = device.start_voice(
            Arc::clone(&track.buffer),
            offset,
            track.mix.resolve_gain(any_solo),
            track.mix.pan,
        )?;
        track.voice = Some(voice);
        Ok(())
    }

    /// Stop and release every live voice
    pub fn release_all(&mut self, device: &mut dyn AudioDevice) {
        for track in self.slots.iter_mut().flatten() {
            track.release(device);
        }
    }

    /// Push resolved gains of all tracks to their live voices
    pub fn apply_gains(&self, device: &mut dyn AudioDevice) {
        let any_solo = self.any_solo();
        for track in self.iter() {
            if let Some(voice) = track.voice {
                device.set_voice_gain(voice, track.mix.resolve_gain(any_solo));
            }
        }
    }

    /// Push one track's pan to its live voice
    pub fn apply_pan(&self, id: &str, device: &mut dyn AudioDevice) {
        if let Some(track) = self.get(id) {
            if let Some(voice) = track.voice {
                device.set_voice_pan(voice, track.mix.pan);
            }
        }
    }

    /// Display snapshots in insertion order
    pub fn infos(&self) -> Vec<TrackInfo> {
        let any_solo = self.any_solo();
        self.iter()
            .map(|track| TrackInfo {
                id: track.id.clone(),
                name: track.name.clone(),
                source: track.source.clone(),
                duration: track.duration_secs(),
                channels: track.buffer.channels(),
                volume: track.mix.volume,
                pan: track.mix.pan,
                muted: track.mix.muted,
                solo: track.mix.solo,
                effective_gain: track.mix.resolve_gain(any_solo),
                live: track.is_live(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::device::HeadlessDevice;

    fn track(id: &str, secs: f64) -> StemTrack {
        let buffer = AudioBuffer::new((secs * 100.0) as usize, ChannelLayout::Stereo, 100);
        StemTrack::new(id, id.to_uppercase(), format!("{}.wav", id), Arc::new(buffer))
    }

    fn open_device() -> HeadlessDevice {
        let mut device = HeadlessDevice::new(100);
        device.open().unwrap();
        device
    }

    #[test]
    fn test_insert_and_order() {
        let mut device = open_device();
        let mut registry = TrackRegistry::new();
        registry.insert(track("drums", 1.0), &mut device);
        registry.insert(track("bass", 2.0), &mut device);

        let ids: Vec<_> = registry.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["drums", "bass"]);
        assert_eq!(registry.max_duration(), 2.0);
    }

    #[test]
    fn test_replace_keeps_position_and_releases_voice() {
        let mut device = open_device();
        let mut registry = TrackRegistry::new();
        registry.insert(track("drums", 1.0), &mut device);
        registry.insert(track("bass", 1.0), &mut device);
        registry.start_all(&mut device, 0.0).unwrap();
        assert_eq!(device.active_voices(), 2);

        let old = registry.insert(track("drums", 3.0), &mut device).unwrap();
        assert!(!old.is_live());
        assert_eq!(device.active_voices(), 1);
        assert_eq!(registry.iter().next().unwrap().duration_secs(), 3.0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_releases_voice() {
        let mut device = open_device();
        let mut registry = TrackRegistry::new();
        registry.insert(track("vox", 1.0), &mut device);
        registry.start_all(&mut device, 0.5).unwrap();

        let removed = registry.remove("vox", &mut device).unwrap();
        assert!(!removed.is_live());
        assert_eq!(device.active_voices(), 0);
        assert!(registry.is_empty());
        assert!(registry.remove("vox", &mut device).is_err());
    }

    #[test]
    fn test_release_all_clears_handles() {
        let mut device = open_device();
        let mut registry = TrackRegistry::new();
        registry.insert(track("a", 1.0), &mut device);
        registry.insert(track("b", 1.0), &mut device);
        registry.start_all(&mut device, 0.0).unwrap();

        registry.release_all(&mut device);
        assert!(registry.iter().all(|t| !t.is_live()));
        assert_eq!(device.active_voices(), 0);
    }

    #[test]
    fn test_start_all_failure_rolls_back() {
        let mut device = HeadlessDevice::new(100);
        let mut registry = TrackRegistry::new();
        registry.insert(track("a", 1.0), &mut device);

        assert!(registry.start_all(&mut device, 0.0).is_err());
        assert!(registry.iter().all(|t| !t.is_live()));
    }

    #[test]
    fn test_effective_gain_follows_solo() {
        let mut device = open_device();
        let mut registry = TrackRegistry::new();
        registry.insert(track("a", 1.0), &mut device);
        registry.insert(track("b", 1.0), &mut device);
        registry.update_mix("a", |mix| mix.solo = true).unwrap();
        registry.update_mix("b", |mix| mix.volume = 0.4).unwrap();

        assert_eq!(registry.effective_gain("a"), Some(1.0));
        assert_eq!(registry.effective_gain("b"), Some(0.0));

        registry.update_mix("a", |mix| mix.solo = false).unwrap();
        assert_eq!(registry.effective_gain("b"), Some(0.4));
    }

    #[test]
    fn test_update_unknown_track() {
        let mut registry = TrackRegistry::new();
        let err = registry.update_mix("ghost", |mix| mix.muted = true).unwrap_err();
        assert_eq!(err.error_code(), "TRACK_NOT_FOUND");
    }
}
