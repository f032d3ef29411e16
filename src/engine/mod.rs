//! Stem engine
//!
//! Decoding, mixing, live playback and offline export of multi-stem
//! sessions.

pub mod buffer;
#[cfg(feature = "device-output")]
pub mod cpal_output;
pub mod device;
pub mod io;
pub mod loader;
pub mod mixer;
pub mod registry;
pub mod render;
pub mod stem_engine;
pub mod transport;

pub use buffer::{AudioBuffer, ChannelLayout};
#[cfg(feature = "device-output")]
pub use cpal_output::CpalDevice;
pub use device::{AudioDevice, HeadlessDevice, VoiceHandle};
pub use io::{decode_audio, encode_wav, resample, write_wav_file, PcmScaling};
pub use loader::{load_audio, DefaultLoader, FileLoader, HttpLoader, MemoryLoader, SourceLoader};
pub use mixer::MixState;
pub use registry::{StemTrack, TrackInfo, TrackRegistry};
pub use render::{export_clip, export_mix, render_offline, ClipExport};
pub use stem_engine::{StemEngine, StemEngineBuilder};
pub use transport::{EngineState, Transport};
