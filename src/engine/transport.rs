//! Transport State Machine for Stemmix
//!
//! Tracks engine state, the playback epoch and the paused offset, and the
//! session of the time-update loop. The transport never reads a clock
//! itself: callers pass the device time in.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No device acquired yet, or disposed (default state)
    #[default]
    Idle,
    /// A track is being fetched and decoded
    Loading,
    /// Tracks loaded, not playing
    Ready,
    /// All tracks are sounding
    Playing,
    /// The last operation failed
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Error => write!(f, "error"),
        }
    }
}

/// Playback position bookkeeping
///
/// While playing, `current_time = now - epoch + paused_offset`. Otherwise the
/// position is `paused_offset`, which always lies within `[0, duration]`.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    state: EngineState,

    /// Device time at which the current play session started
    epoch: f64,

    /// Position in seconds when not playing, or at the start of a session
    paused_offset: f64,

    /// Longest track seen; never shrinks until reset
    duration: f64,

    /// Active time-update loop, if any
    loop_session: Option<u64>,

    /// Sessions handed out so far
    sessions_started: u64,
}

impl Transport {
    /// Create a transport in the idle state at position 0
    ///
    /// # Example
    /// ```
    /// use stemmix::engine::transport::{EngineState, Transport};
    /// let transport = Transport::new();
    /// assert_eq!(transport.state(), EngineState::Idle);
    /// assert_eq!(transport.current_time(0.0), 0.0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!("[TRANSPORT] {} -> {}", self.state, state);
        }
        self.state = state;
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Playback position given the device time `now`
    pub fn current_time(&self, now: f64) -> f64 {
        if self.is_playing() {
            self.session_position(now)
        } else {
            self.paused_offset
        }
    }

    /// Position reached by the latest play session, whatever the state
    pub fn session_position(&self, now: f64) -> f64 {
        now - self.epoch + self.paused_offset
    }

    pub fn paused_offset(&self) -> f64 {
        self.paused_offset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Grow the duration to cover a track of `secs`
    pub fn extend_duration(&mut self, secs: f64) {
        self.duration = self.duration.max(secs);
    }

    fn clamp_to_duration(&self, secs: f64) -> f64 {
        if secs.is_nan() {
            return 0.0;
        }
        secs.clamp(0.0, self.duration)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Enter `Playing` with the epoch at `now`
    ///
    /// Starts a new time-update loop session and returns its id.
    pub fn play(&mut self, now: f64) -> u64 {
        self.epoch = now;
        self.set_state(EngineState::Playing);
        debug!("[TRANSPORT] Play from {:.3}s", self.paused_offset);
        self.start_loop()
    }

    /// Re-anchor the epoch at `now` without changing state
    pub fn restart(&mut self, now: f64) {
        self.epoch = now;
    }

    /// Capture the position and enter `Ready`
    pub fn pause(&mut self, now: f64) {
        self.paused_offset = self.clamp_to_duration(self.current_time(now));
        self.set_state(EngineState::Ready);
        debug!("[TRANSPORT] Paused at {:.3}s", self.paused_offset);
    }

    /// Reset the position to 0 and enter `Ready`
    pub fn stop(&mut self) {
        self.paused_offset = 0.0;
        self.set_state(EngineState::Ready);
        debug!("[TRANSPORT] Stopped, position reset to 0");
    }

    /// Move the paused offset, clamped to `[0, duration]`
    ///
    /// Returns the clamped position.
    pub fn seek(&mut self, secs: f64) -> f64 {
        self.paused_offset = self.clamp_to_duration(secs);
        debug!("[TRANSPORT] Seek to {:.3}s", self.paused_offset);
        self.paused_offset
    }

    /// Forget everything: idle, position 0, duration 0, no loop
    pub fn reset(&mut self) {
        let sessions_started = self.sessions_started;
        *self = Self {
            sessions_started,
            ..Self::default()
        };
    }

    // ========================================================================
    // Time-update loop
    // ========================================================================

    fn start_loop(&mut self) -> u64 {
        self.sessions_started += 1;
        self.loop_session = Some(self.sessions_started);
        self.sessions_started
    }

    /// Cancel the active loop session
    ///
    /// Returns true only for the call that actually cancelled a session.
    pub fn cancel_loop(&mut self) -> bool {
        match self.loop_session.take() {
            Some(session) => {
                debug!("[TRANSPORT] Time loop {} cancelled", session);
                true
            }
            None => false,
        }
    }

    pub fn loop_session(&self) -> Option<u64> {
        self.loop_session
    }

    /// Whether `session` is the loop currently running
    pub fn is_loop_active(&self, session: u64) -> bool {
        self.loop_session == Some(session)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
