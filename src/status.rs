//! User-facing status messages
//!
//! Every situation the status region can show is a variant here; the
//! displayed text comes from `Display`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    /// Recognition session is running
    Listening,
    /// Response audio is playing, recognition suspended
    PlayingResponse,
    /// Interactive permission request succeeded
    PermissionGranted,
    /// Microphone permission is denied
    PermissionDenied,
    /// Microphone not yet enabled at startup
    EnableMicrophone,
    /// Permission query itself failed
    PermissionCheckFailed,
    /// Engine refused to start after every retry
    StartFailed,
    /// Engine reported a mid-session error
    RecognitionError { code: String },
    /// Listening stopped by a termination phrase
    StoppedByPhrase { resume_phrase: String },
    /// Response audio failed to play
    PlaybackFailed,
    /// Utterance handoff was rejected
    SubmitFailed { reason: String },
    /// No recognition engine available
    Unsupported,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Listening => write!(f, "Listening... Speak now."),
            Status::PlayingResponse => write!(f, "Playing response..."),
            Status::PermissionGranted => write!(f, "Microphone access granted. Listening..."),
            Status::PermissionDenied => write!(
                f,
                "Microphone access denied. Please click \"Enable Microphone\" to allow access."
            ),
            Status::EnableMicrophone => write!(f, "Please click \"Enable Microphone\" to start."),
            Status::PermissionCheckFailed => write!(
                f,
                "Error checking microphone permission. Please ensure access is granted."
            ),
            Status::StartFailed => write!(
                f,
                "Failed to start microphone after retries. Please click \"Enable Microphone\"."
            ),
            Status::RecognitionError { code } => write!(f, "Error: {}. Retrying...", code),
            Status::StoppedByPhrase { resume_phrase } => write!(
                f,
                "Stopped listening. Say \"{}\" or click \"Enable Microphone\".",
                resume_phrase
            ),
            Status::PlaybackFailed => write!(f, "Error playing audio. Listening resumed."),
            Status::SubmitFailed { reason } => {
                write!(f, "Could not send your message: {}", reason)
            }
            Status::Unsupported => write!(f, "Speech recognition is not supported here."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_includes_code() {
        let status = Status::RecognitionError {
            code: "network".to_string(),
        };
        assert_eq!(status.to_string(), "Error: network. Retrying...");
    }

    #[test]
    fn test_status_serialization() {
        let status = Status::StoppedByPhrase {
            resume_phrase: "start listening".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("stopped_by_phrase"));
        assert!(json.contains("start listening"));
    }
}
