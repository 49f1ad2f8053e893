//! Events module for voice session transitions
//!
//! Provides structured event types broadcast by the session whenever
//! recognition, playback, processing, input or status change.

use serde::{Deserialize, Serialize};

use crate::playback::PlaybackState;
use crate::recognition::RecognitionState;
use crate::status::Status;

/// Events emitted by the voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Status region text changed
    StatusChanged {
        status: Status,
        /// Rendered text for display
        text: String,
    },

    /// Recognition lifecycle moved between states
    RecognitionChanged {
        from: RecognitionState,
        to: RecognitionState,
    },

    /// Response audio started or stopped
    PlaybackChanged { state: PlaybackState },

    /// An utterance handoff began or the round-trip finished
    ProcessingChanged { processing: bool },

    /// Input field contents replaced (empty when cleared)
    InputChanged { text: String },

    /// Finalized utterance handed to the submission sink
    UtteranceSubmitted { text: String },
}

impl VoiceEvent {
    pub fn status(status: Status) -> Self {
        let text = status.to_string();
        VoiceEvent::StatusChanged { status, text }
    }
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::StatusChanged { text, .. } => write!(f, "STATUS_CHANGED ({})", text),
            VoiceEvent::RecognitionChanged { from, to } => {
                write!(f, "RECOGNITION_CHANGED ({} -> {})", from, to)
            }
            VoiceEvent::PlaybackChanged { state } => write!(f, "PLAYBACK_CHANGED ({})", state),
            VoiceEvent::ProcessingChanged { processing } => {
                write!(f, "PROCESSING_CHANGED ({})", processing)
            }
            VoiceEvent::InputChanged { text } => {
                write!(f, "INPUT_CHANGED ({} chars)", text.chars().count())
            }
            VoiceEvent::UtteranceSubmitted { text } => {
                write!(f, "UTTERANCE_SUBMITTED ({} chars)", text.chars().count())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = VoiceEvent::RecognitionChanged {
            from: RecognitionState::Starting,
            to: RecognitionState::Active,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("recognition_changed"));
        assert!(json.contains("active"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"event":"playback_changed","state":"playing"}"#;
        let event: VoiceEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            VoiceEvent::PlaybackChanged {
                state: PlaybackState::Playing
            }
        ));
    }

    #[test]
    fn test_status_event_renders_text() {
        let event = VoiceEvent::status(Status::Listening);
        assert_eq!(event.to_string(), "STATUS_CHANGED (Listening... Speak now.)");
    }
}
