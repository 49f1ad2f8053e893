//! Messages consumed by the voice session
//!
//! Engine callbacks, playback signals, user input and internal completions
//! (timers, permission checks) all arrive on the same queue and are
//! handled strictly in arrival order.

use crate::permission::Capability;
use crate::playback::PlaybackSignal;
use crate::recognition::ResultBatch;

#[derive(Debug)]
pub enum Message {
    /// Engine: session started
    RecognitionStarted,
    /// Engine: new interim/final results
    RecognitionResult(ResultBatch),
    /// Engine: session ended
    RecognitionEnded,
    /// Engine: session failed
    RecognitionError { code: String },

    /// Audio element lifecycle
    Playback(PlaybackSignal),

    /// User typed into the input field
    TextInput(String),
    /// User pressed submit
    SubmitText,
    /// User asked to enable the microphone
    EnableMicrophone,

    /// Capability check for a start intent resolved
    CapabilityChecked { intent: u64, capability: Capability },
    /// Interactive permission request resolved
    PermissionResolved(Capability),
    /// Backoff delay before a start retry elapsed
    RetryElapsed { intent: u64 },
    /// Silence debounce elapsed
    SilenceElapsed { generation: u64 },
    /// Post-submission input clear delay elapsed
    ClearInput { generation: u64 },
}
