//! Stemmix - Multi-Stem Mixing and Analysis
//!
//! Stemmix provides two independent halves:
//! 1. Stem Engine - synchronized playback of several stems with per-track
//!    volume, pan, mute and solo, plus offline export of the same mix to WAV
//! 2. Analysis - tempo, key and loudness estimation and pairwise
//!    compatibility scoring for deciding which tracks blend
//!
//! # Architecture
//!
//! The engine never touches a platform audio API directly. It drives an
//! `AudioDevice` (a clock plus a voice mixer), so the control logic runs the
//! same against real hardware and the in-process `HeadlessDevice`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;

pub use error::{Result, StemError};
