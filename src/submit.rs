//! Handoff of finalized utterances to the transport
//!
//! The sink only receives the text; delivery to a backend and rendering
//! of the reply happen outside the daemon.

/// Errors from the submission sink
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("no front-end attached to receive the utterance")]
    NoFrontend,
}

/// Accepts a finalized utterance for submission
pub trait UtteranceSink: Send {
    fn submit(&mut self, text: &str) -> Result<(), SubmitError>;
}
