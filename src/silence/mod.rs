//! Silence-based utterance finalization
//!
//! Engines emit several "final" segments per sentence, so a final
//! transcript only becomes an utterance after `silence_threshold` passes
//! with no newer final text. One debounce timer exists at a time; each
//! arming bumps a generation so a fire that was already queued when the
//! timer was replaced is recognised as stale.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::VoiceConfig;
use crate::phrases::ControlPhrases;
use crate::recognition::TranscriptUpdate;
use crate::state::Message;
use crate::timer::TimerHandle;

/// What a transcript update means for the current utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Final text carries a termination phrase; stop listening, never submit
    Terminate,
    /// Debounce timer (re)armed for this final text
    Armed,
    /// Nothing to finalize yet
    Ignored,
}

struct Candidate {
    generation: u64,
    text: String,
    _timer: TimerHandle,
}

pub struct SilenceFinalizer {
    threshold: Duration,
    min_chars: usize,
    phrases: ControlPhrases,
    generation: u64,
    candidate: Option<Candidate>,
    loopback: mpsc::Sender<Message>,
}

impl SilenceFinalizer {
    pub fn new(config: &VoiceConfig, loopback: mpsc::Sender<Message>) -> Self {
        Self {
            threshold: config.silence_threshold,
            min_chars: config.min_utterance_chars,
            phrases: ControlPhrases::from_config(config),
            generation: 0,
            candidate: None,
            loopback,
        }
    }

    /// Whether a debounce timer is pending
    pub fn is_armed(&self) -> bool {
        self.candidate.is_some()
    }

    /// Feed one transcript update
    pub fn on_transcript_update(&mut self, update: &TranscriptUpdate, processing: bool) -> Verdict {
        let final_text = update.final_text.as_str();

        if self.phrases.is_termination(final_text) {
            self.cancel();
            info!("termination phrase heard");
            return Verdict::Terminate;
        }

        if final_text.is_empty() || processing || final_text.chars().count() <= self.min_chars {
            return Verdict::Ignored;
        }

        self.generation += 1;
        let timer = TimerHandle::schedule(
            self.threshold,
            self.loopback.clone(),
            Message::SilenceElapsed {
                generation: self.generation,
            },
        );
        // Replacing the candidate drops, and so aborts, the previous timer
        self.candidate = Some(Candidate {
            generation: self.generation,
            text: final_text.to_string(),
            _timer: timer,
        });

        debug!(
            generation = self.generation,
            threshold_ms = self.threshold.as_millis() as u64,
            "silence timer armed"
        );
        Verdict::Armed
    }

    /// Debounce timer fired; yields the utterance if the fire is current
    pub fn on_elapsed(&mut self, generation: u64) -> Option<String> {
        match &self.candidate {
            Some(candidate) if candidate.generation == generation => {
                self.candidate.take().map(|c| c.text)
            }
            _ => {
                debug!(generation, "stale silence timer");
                None
            }
        }
    }

    /// Drop any pending candidate and its timer
    pub fn cancel(&mut self) {
        if self.candidate.take().is_some() {
            debug!("silence timer cancelled");
        }
    }
}

impl std::fmt::Debug for SilenceFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilenceFinalizer")
            .field("generation", &self.generation)
            .field("armed", &self.is_armed())
            .finish()
    }
}
