//! Recognition session lifecycle
//!
//! Owns the engine handle and `RecognitionState`. Starts go through two
//! phases: `begin` claims the Starting state and hands out an intent id,
//! then `commit` runs once the capability check for that intent resolves.
//! Guards are evaluated again at commit so a playback start that arrived
//! in between always wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine::RecognitionEngine;
use super::retry::RetryBudget;
use crate::config::VoiceConfig;
use crate::permission::Capability;
use crate::playback::PlaybackState;
use crate::state::Message;
use crate::timer::TimerHandle;

/// Lifecycle of the recognition session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    /// No session and no start in progress
    #[default]
    Idle,
    /// Capability check or backoff retry in progress
    Starting,
    /// Engine session running
    Active,
    /// Stop requested, waiting for the engine's `ended`
    Stopping,
}

impl std::fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionState::Idle => write!(f, "Idle"),
            RecognitionState::Starting => write!(f, "Starting"),
            RecognitionState::Active => write!(f, "Active"),
            RecognitionState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Why a start was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    Startup,
    PermissionGranted,
    ResumePhrase,
    AfterPlayback,
    AfterSessionEnd,
    AfterRecognitionError,
}

impl std::fmt::Display for StartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartReason::Startup => write!(f, "startup"),
            StartReason::PermissionGranted => write!(f, "permission_granted"),
            StartReason::ResumePhrase => write!(f, "resume_phrase"),
            StartReason::AfterPlayback => write!(f, "after_playback"),
            StartReason::AfterSessionEnd => write!(f, "after_session_end"),
            StartReason::AfterRecognitionError => write!(f, "after_recognition_error"),
        }
    }
}

/// One intent to start listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartIntent {
    pub id: u64,
    pub reason: StartReason,
}

/// Result of committing a start intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Intent was superseded or cancelled before the check resolved
    Stale,
    /// Playback began while the check was in flight
    Superseded,
    /// Microphone not authorized; terminal for this intent
    NotPermitted {
        capability: Capability,
        reason: StartReason,
    },
    /// Engine session is running
    Started,
    /// Engine refused; a backoff retry is armed
    RetryScheduled { retry: u32, delay: Duration },
    /// Engine refused and the retry budget is spent
    Exhausted,
}

/// Single writer of `RecognitionState` and the engine handle
pub struct RecognitionController {
    engine: Box<dyn RecognitionEngine>,
    state: RecognitionState,
    next_intent: u64,
    intent: Option<StartIntent>,
    retry: RetryBudget,
    retry_timer: Option<TimerHandle>,
    loopback: mpsc::Sender<Message>,
}

impl RecognitionController {
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        config: &VoiceConfig,
        loopback: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            engine,
            state: RecognitionState::Idle,
            next_intent: 0,
            intent: None,
            retry: RetryBudget::from_config(config),
            retry_timer: None,
            loopback,
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RecognitionState::Active
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_supported()
    }

    /// Claim the Starting state for a new intent
    ///
    /// Returns `None` (a logged skip) while playback is audible or a
    /// session is already starting, running or stopping.
    pub fn begin(&mut self, reason: StartReason, playback: PlaybackState) -> Option<StartIntent> {
        if playback.is_playing() || self.state != RecognitionState::Idle {
            debug!(
                %reason,
                %playback,
                recognition = %self.state,
                "cannot start recognition, skipping"
            );
            return None;
        }

        self.next_intent += 1;
        let intent = StartIntent {
            id: self.next_intent,
            reason,
        };
        self.intent = Some(intent);
        self.retry.reset();
        self.set_state(RecognitionState::Starting);

        debug!(intent = intent.id, %reason, "start intent claimed");
        Some(intent)
    }

    /// Start the engine for `intent_id` now that its capability is known
    pub fn commit(
        &mut self,
        intent_id: u64,
        capability: Capability,
        playback: PlaybackState,
    ) -> StartOutcome {
        let Some(intent) = self.live_intent(intent_id) else {
            debug!(intent = intent_id, "capability check for stale intent");
            return StartOutcome::Stale;
        };

        if playback.is_playing() {
            info!(intent = intent.id, "playback began during start, abandoning");
            self.abandon();
            return StartOutcome::Superseded;
        }

        if !capability.is_granted() {
            info!(intent = intent.id, %capability, "microphone not authorized");
            self.abandon();
            return StartOutcome::NotPermitted {
                capability,
                reason: intent.reason,
            };
        }

        match self.engine.start() {
            Ok(()) => {
                info!(intent = intent.id, reason = %intent.reason, "speech recognition started");
                self.intent = None;
                self.retry.reset();
                self.retry_timer = None;
                self.set_state(RecognitionState::Active);
                StartOutcome::Started
            }
            Err(e) => match self.retry.next_retry() {
                Some((retry, delay)) => {
                    warn!(
                        intent = intent.id,
                        error = %e,
                        retry,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "recognition start failed, retrying"
                    );
                    self.retry_timer = Some(TimerHandle::schedule(
                        delay,
                        self.loopback.clone(),
                        Message::RetryElapsed { intent: intent.id },
                    ));
                    StartOutcome::RetryScheduled { retry, delay }
                }
                None => {
                    error!(intent = intent.id, error = %e, "max retries reached for recognition start");
                    self.abandon();
                    StartOutcome::Exhausted
                }
            },
        }
    }

    /// A backoff timer fired; returns the intent to re-check if still live
    pub fn retry_elapsed(&mut self, intent_id: u64, playback: PlaybackState) -> Option<StartIntent> {
        let intent = self.live_intent(intent_id)?;
        self.retry_timer = None;

        if playback.is_playing() {
            self.abandon();
            return None;
        }

        debug!(intent = intent.id, retry = self.retry.used(), "retrying recognition start");
        Some(intent)
    }

    /// Request the session to stop. Returns whether anything changed.
    pub fn stop(&mut self) -> bool {
        match self.state {
            RecognitionState::Idle | RecognitionState::Stopping => false,
            RecognitionState::Starting => {
                debug!("cancelling pending recognition start");
                self.abandon();
                true
            }
            RecognitionState::Active => {
                self.engine.stop();
                self.set_state(RecognitionState::Stopping);
                true
            }
        }
    }

    /// Engine reported its session started
    ///
    /// Returns whether Active was confirmed. A start that lands while
    /// playback is audible is not claimed and the engine is told to stop.
    pub fn on_started(&mut self, playback: PlaybackState) -> bool {
        if playback.is_playing() {
            warn!(recognition = %self.state, "recognition started during playback, stopping it");
            if self.state != RecognitionState::Stopping {
                self.engine.stop();
                self.intent = None;
                self.retry_timer = None;
                self.set_state(RecognitionState::Stopping);
            }
            return false;
        }

        match self.state {
            RecognitionState::Active => true,
            RecognitionState::Starting => {
                self.intent = None;
                self.retry_timer = None;
                self.set_state(RecognitionState::Active);
                true
            }
            RecognitionState::Idle | RecognitionState::Stopping => {
                debug!(recognition = %self.state, "started signal after stop, ignoring");
                false
            }
        }
    }

    /// Engine session ended
    pub fn on_ended(&mut self) {
        self.settle_after_session("ended");
    }

    /// Engine session failed mid-run
    pub fn on_error(&mut self, code: &str) {
        error!(code, "speech recognition error");
        self.settle_after_session("errored");
    }

    fn settle_after_session(&mut self, how: &'static str) {
        match self.state {
            RecognitionState::Active | RecognitionState::Stopping => {
                self.set_state(RecognitionState::Idle);
            }
            RecognitionState::Starting | RecognitionState::Idle => {
                debug!(recognition = %self.state, how, "session signal with no running session");
            }
        }
    }

    fn live_intent(&self, intent_id: u64) -> Option<StartIntent> {
        match self.intent {
            Some(intent) if intent.id == intent_id && self.state == RecognitionState::Starting => {
                Some(intent)
            }
            _ => None,
        }
    }

    fn abandon(&mut self) {
        self.intent = None;
        self.retry_timer = None;
        self.set_state(RecognitionState::Idle);
    }

    fn set_state(&mut self, to: RecognitionState) {
        if self.state != to {
            debug!(from = %self.state, %to, "recognition transition");
            self.state = to;
        }
    }
}

impl std::fmt::Debug for RecognitionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionController")
            .field("state", &self.state)
            .field("intent", &self.intent)
            .field("retries_used", &self.retry.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::EngineError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        starts: usize,
        stops: usize,
        failures_left: usize,
    }

    struct CountingEngine(Arc<Mutex<Calls>>);

    impl RecognitionEngine for CountingEngine {
        fn start(&mut self) -> Result<(), EngineError> {
            let mut calls = self.0.lock().unwrap();
            calls.starts += 1;
            if calls.failures_left > 0 {
                calls.failures_left -= 1;
                return Err(EngineError::Unavailable("device busy".into()));
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.0.lock().unwrap().stops += 1;
        }
    }

    fn controller(failures: usize) -> (RecognitionController, Arc<Mutex<Calls>>, mpsc::Receiver<Message>) {
        let calls = Arc::new(Mutex::new(Calls {
            failures_left: failures,
            ..Default::default()
        }));
        let (tx, rx) = mpsc::channel(8);
        let controller = RecognitionController::new(
            Box::new(CountingEngine(Arc::clone(&calls))),
            &VoiceConfig::default(),
            tx,
        );
        (controller, calls, rx)
    }

    #[tokio::test]
    async fn test_begin_and_commit() {
        let (mut rc, calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        assert_eq!(rc.state(), RecognitionState::Starting);

        let outcome = rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);
        assert_eq!(outcome, StartOutcome::Started);
        assert!(rc.is_active());
        assert_eq!(calls.lock().unwrap().starts, 1);
    }

    #[tokio::test]
    async fn test_begin_skips_when_not_idle_or_playing() {
        let (mut rc, _calls, _rx) = controller(0);
        assert!(rc.begin(StartReason::Startup, PlaybackState::Playing).is_none());
        assert_eq!(rc.state(), RecognitionState::Idle);

        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        assert!(rc.begin(StartReason::ResumePhrase, PlaybackState::Idle).is_none());
        assert_eq!(
            rc.commit(intent.id, Capability::Granted, PlaybackState::Idle),
            StartOutcome::Started
        );
    }

    #[tokio::test]
    async fn test_commit_rechecks_playback() {
        let (mut rc, calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::AfterPlayback, PlaybackState::Idle).unwrap();

        let outcome = rc.commit(intent.id, Capability::Granted, PlaybackState::Playing);
        assert_eq!(outcome, StartOutcome::Superseded);
        assert_eq!(rc.state(), RecognitionState::Idle);
        assert_eq!(calls.lock().unwrap().starts, 0);
    }

    #[tokio::test]
    async fn test_commit_without_permission_is_terminal() {
        let (mut rc, calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();

        let outcome = rc.commit(intent.id, Capability::Denied, PlaybackState::Idle);
        assert_eq!(
            outcome,
            StartOutcome::NotPermitted {
                capability: Capability::Denied,
                reason: StartReason::Startup,
            }
        );
        assert_eq!(rc.state(), RecognitionState::Idle);
        assert_eq!(calls.lock().unwrap().starts, 0);
    }

    #[tokio::test]
    async fn test_stale_intent_is_ignored() {
        let (mut rc, _calls, _rx) = controller(0);
        let first = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        rc.stop();
        let second = rc.begin(StartReason::ResumePhrase, PlaybackState::Idle).unwrap();
        assert_ne!(first.id, second.id);

        assert_eq!(
            rc.commit(first.id, Capability::Granted, PlaybackState::Idle),
            StartOutcome::Stale
        );
        assert_eq!(rc.state(), RecognitionState::Starting);
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_then_exhausts() {
        let (mut rc, calls, _rx) = controller(10);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();

        let expected = [500u64, 1000];
        for (n, ms) in expected.iter().enumerate() {
            let outcome = rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);
            assert_eq!(
                outcome,
                StartOutcome::RetryScheduled {
                    retry: n as u32 + 1,
                    delay: Duration::from_millis(*ms),
                }
            );
            assert_eq!(rc.retry_elapsed(intent.id, PlaybackState::Idle), Some(intent));
        }

        let outcome = rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);
        assert_eq!(outcome, StartOutcome::Exhausted);
        assert_eq!(rc.state(), RecognitionState::Idle);
        assert_eq!(calls.lock().unwrap().starts, 3);
        assert_eq!(rc.retry_elapsed(intent.id, PlaybackState::Idle), None);
    }

    #[tokio::test]
    async fn test_stop_active_waits_for_ended() {
        let (mut rc, calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);

        assert!(rc.stop());
        assert_eq!(rc.state(), RecognitionState::Stopping);
        assert!(!rc.stop());
        assert_eq!(calls.lock().unwrap().stops, 1);

        rc.on_ended();
        assert_eq!(rc.state(), RecognitionState::Idle);
        assert!(!rc.stop());
    }

    #[tokio::test]
    async fn test_started_during_playback_is_not_claimed() {
        let (mut rc, calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);

        assert!(!rc.on_started(PlaybackState::Playing));
        assert_eq!(rc.state(), RecognitionState::Stopping);
        assert_eq!(calls.lock().unwrap().stops, 1);
    }

    #[tokio::test]
    async fn test_error_returns_to_idle() {
        let (mut rc, _calls, _rx) = controller(0);
        let intent = rc.begin(StartReason::Startup, PlaybackState::Idle).unwrap();
        rc.commit(intent.id, Capability::Granted, PlaybackState::Idle);

        rc.on_error("network");
        assert_eq!(rc.state(), RecognitionState::Idle);
    }
}
