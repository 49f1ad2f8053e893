//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::VoiceEvent;
use crate::permission::Capability;
use crate::playback::{PlaybackSignal, PlaybackState};
use crate::recognition::{EngineSettings, RecognitionState, ResultBatch, TranscriptSegment};
use crate::state::Message;

/// Requests from a front-end to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current session status
    GetStatus,

    /// Receive commands and session events
    Subscribe,

    /// Engine: session started
    RecognitionStarted,

    /// Engine: interim/final results
    RecognitionResult {
        results: Vec<TranscriptSegment>,
        #[serde(default)]
        result_index: usize,
    },

    /// Engine: session ended
    RecognitionEnded,

    /// Engine: session failed
    RecognitionError { code: String },

    /// Response audio element lifecycle
    Playback { signal: PlaybackSignal },

    /// Input field edited by the user
    TextInput { text: String },

    /// Submit button pressed
    Submit,

    /// "Enable Microphone" pressed
    EnableMicrophone,

    /// Current microphone authorization as seen by the front-end
    PermissionState { capability: Capability },

    /// Stop the daemon
    Shutdown,
}

impl Request {
    /// Session message carried by this request, if any
    pub fn into_message(self) -> Option<Message> {
        match self {
            Request::RecognitionStarted => Some(Message::RecognitionStarted),
            Request::RecognitionResult {
                results,
                result_index,
            } => Some(Message::RecognitionResult(ResultBatch::new(
                results,
                result_index,
            ))),
            Request::RecognitionEnded => Some(Message::RecognitionEnded),
            Request::RecognitionError { code } => Some(Message::RecognitionError { code }),
            Request::Playback { signal } => Some(Message::Playback(signal)),
            Request::TextInput { text } => Some(Message::TextInput(text)),
            Request::Submit => Some(Message::SubmitText),
            Request::EnableMicrophone => Some(Message::EnableMicrophone),
            Request::Ping
            | Request::GetStatus
            | Request::Subscribe
            | Request::PermissionState { .. }
            | Request::Shutdown => None,
        }
    }
}

/// Responses from daemon to front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current session status
    Status(SessionStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Request queued for the session
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push messages for subscribed front-ends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Start the recognition engine with these settings
    StartRecognition {
        language: String,
        continuous: bool,
        interim_results: bool,
    },

    /// Stop the recognition engine
    StopRecognition,

    /// Show the microphone permission prompt and report the outcome
    PromptPermission,

    /// Submit the finalized utterance
    SubmitUtterance { text: String },

    /// Session event occurred
    Event(VoiceEvent),
}

impl Notification {
    pub fn start_recognition(settings: &EngineSettings) -> Self {
        Notification::StartRecognition {
            language: settings.language.clone(),
            continuous: settings.continuous,
            interim_results: settings.interim_results,
        }
    }
}

/// Full session status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Daemon version
    pub version: String,

    pub recognition: RecognitionState,

    pub playback: PlaybackState,

    /// An utterance is in flight
    pub processing: bool,

    /// Input field contents
    pub input: String,

    /// Status region text
    pub status: Option<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            recognition: RecognitionState::default(),
            playback: PlaybackState::default(),
            processing: false,
            input: String::new(),
            status: None,
            uptime_secs: 0,
        }
    }
}

impl SessionStatus {
    /// Fold a session event into the snapshot
    pub fn apply(&mut self, event: &VoiceEvent) {
        match event {
            VoiceEvent::StatusChanged { text, .. } => self.status = Some(text.clone()),
            VoiceEvent::RecognitionChanged { to, .. } => self.recognition = *to,
            VoiceEvent::PlaybackChanged { state } => self.playback = *state,
            VoiceEvent::ProcessingChanged { processing } => self.processing = *processing,
            VoiceEvent::InputChanged { text } => self.input = text.clone(),
            VoiceEvent::UtteranceSubmitted { .. } => {}
        }
    }
}
