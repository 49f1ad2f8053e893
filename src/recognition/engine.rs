//! Boundary to the continuous speech-to-text engine
//!
//! The engine is consumed, not implemented here: `start`/`stop` are
//! commands, and its lifecycle callbacks arrive as session messages.

use serde::{Deserialize, Serialize};

use crate::config::VoiceConfig;

/// Errors raised synchronously by an engine start
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
}

/// Fixed engine configuration, applied at initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
}

impl EngineSettings {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: config.language.clone(),
        }
    }
}

/// A continuous recognition session handle
pub trait RecognitionEngine: Send {
    /// Whether recognition is available at all on this host
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin a session. Errors are retried by the controller.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Ask the running session to end; `ended` follows asynchronously
    fn stop(&mut self);
}

/// One alternative of one recognition result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub transcript: String,
    pub is_final: bool,
}

impl TranscriptSegment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// Payload of a `result` callback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub results: Vec<TranscriptSegment>,
    /// First result that changed since the previous callback
    #[serde(default)]
    pub result_index: usize,
}

impl ResultBatch {
    pub fn new(results: Vec<TranscriptSegment>, result_index: usize) -> Self {
        Self {
            results,
            result_index,
        }
    }

    /// Fold the changed results into final and interim text
    pub fn transcript(&self) -> TranscriptUpdate {
        let mut update = TranscriptUpdate::default();

        for segment in self.results.iter().skip(self.result_index) {
            let text = segment.transcript.trim().to_lowercase();
            if segment.is_final {
                update.final_text.push_str(&text);
            } else {
                update.interim_text.push_str(&text);
            }
        }

        update
    }
}

/// Final and interim text extracted from one result batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptUpdate {
    pub final_text: String,
    pub interim_text: String,
}

impl TranscriptUpdate {
    /// Live candidate text for the input field
    pub fn display(&self) -> &str {
        if self.final_text.is_empty() {
            &self.interim_text
        } else {
            &self.final_text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_splits_final_and_interim() {
        let batch = ResultBatch::new(
            vec![
                TranscriptSegment::final_(" Hello World "),
                TranscriptSegment::interim("and more"),
            ],
            0,
        );
        let update = batch.transcript();
        assert_eq!(update.final_text, "hello world");
        assert_eq!(update.interim_text, "and more");
        assert_eq!(update.display(), "hello world");
    }

    #[test]
    fn test_transcript_skips_before_result_index() {
        let batch = ResultBatch::new(
            vec![
                TranscriptSegment::final_("already handled"),
                TranscriptSegment::interim("hello wor"),
            ],
            1,
        );
        let update = batch.transcript();
        assert!(update.final_text.is_empty());
        assert_eq!(update.display(), "hello wor");
    }

    #[test]
    fn test_batch_deserialization_defaults_index() {
        let json = r#"{"results":[{"transcript":"hi","is_final":true}]}"#;
        let batch: ResultBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.result_index, 0);
        assert_eq!(batch.transcript().final_text, "hi");
    }

    #[test]
    fn test_settings_are_continuous_with_interim() {
        let settings = EngineSettings::from_config(&VoiceConfig::default());
        assert!(settings.continuous);
        assert!(settings.interim_results);
        assert_eq!(settings.language, "en-US");
    }
}
