//! Voice session coordinator
//!
//! Ties the permission gate, recognition controller, silence finalizer
//! and playback monitor together. Enforces:
//! - recognition Active never coexists with playback Playing
//! - at most one utterance submission in flight
//! - starts only when idle, not playing, and the microphone is granted

mod machine;
mod message;

pub use machine::{Collaborators, VoiceSession};
pub use message::Message;
