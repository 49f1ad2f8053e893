//! Speech recognition lifecycle
//!
//! State machine: Idle -> Starting -> Active -> Stopping -> Idle, with
//! Starting -> Idle when a start is cancelled, not permitted, or out of
//! retries, and Starting re-entered across backoff retries.

mod controller;
mod engine;
mod retry;

pub use controller::{RecognitionController, RecognitionState, StartIntent, StartOutcome, StartReason};
pub use engine::{
    EngineError, EngineSettings, RecognitionEngine, ResultBatch, TranscriptSegment,
    TranscriptUpdate,
};
pub use retry::RetryBudget;
