//! Playback monitor for the response audio element
//!
//! Translates the element's play/ended/error signals into
//! `PlaybackState` transitions. The session reacts to the transitions;
//! this module only owns the state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Whether response audio is currently audible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Playing => write!(f, "Playing"),
        }
    }
}

/// Lifecycle signals raised by the audio element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSignal {
    Play,
    Ended,
    Error,
}

/// Single writer of `PlaybackState`
#[derive(Debug, Default)]
pub struct PlaybackMonitor {
    state: PlaybackState,
}

impl PlaybackMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Audio started playing
    pub fn on_play_start(&mut self) {
        if self.state.is_playing() {
            debug!("play signal while already playing");
        }
        self.state = PlaybackState::Playing;
        info!("response playback started");
    }

    /// Audio finished normally
    pub fn on_play_end(&mut self) {
        self.state = PlaybackState::Idle;
        info!("response playback ended");
    }

    /// Audio failed; for state purposes identical to a normal end
    pub fn on_play_error(&mut self) {
        self.state = PlaybackState::Idle;
        warn!("response playback failed");
    }
}
