//! Core voice session state machine
//!
//! `VoiceSession::handle` is the only place session state changes. Each
//! message is dispatched to the owning component, and afterwards the
//! recognition/playback/processing flags are diffed and broadcast.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::message::Message;
use crate::config::VoiceConfig;
use crate::events::VoiceEvent;
use crate::permission::{Capability, PermissionBackend, PermissionGate};
use crate::phrases::ControlPhrases;
use crate::playback::{PlaybackMonitor, PlaybackSignal, PlaybackState};
use crate::recognition::{
    RecognitionController, RecognitionEngine, RecognitionState, ResultBatch, StartIntent,
    StartOutcome, StartReason,
};
use crate::silence::{SilenceFinalizer, Verdict};
use crate::status::Status;
use crate::submit::UtteranceSink;
use crate::timer::TimerHandle;

/// External capabilities the session drives
pub struct Collaborators {
    pub engine: Box<dyn RecognitionEngine>,
    pub permissions: Arc<dyn PermissionBackend>,
    pub sink: Box<dyn UtteranceSink>,
}

/// Flags diffed after every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flags {
    recognition: RecognitionState,
    playback: PlaybackState,
    processing: bool,
}

/// The voice session coordinator
pub struct VoiceSession {
    recognition: RecognitionController,
    playback: PlaybackMonitor,
    finalizer: SilenceFinalizer,
    gate: PermissionGate,
    sink: Box<dyn UtteranceSink>,
    phrases: ControlPhrases,
    /// An utterance is handed off and its round-trip has not finished
    processing: bool,
    /// Input field contents: live transcript, typed text, or submitted utterance
    input: String,
    /// Set by a termination phrase; suppresses every automatic restart
    listening_held: bool,
    input_clear_delay: Duration,
    clear_generation: u64,
    clear_timer: Option<TimerHandle>,
    loopback: mpsc::Sender<Message>,
    event_tx: broadcast::Sender<VoiceEvent>,
}

impl VoiceSession {
    /// Create a session; `loopback` must feed the receiver later given to `run`
    pub fn new(
        config: &VoiceConfig,
        collaborators: Collaborators,
        loopback: mpsc::Sender<Message>,
        event_tx: broadcast::Sender<VoiceEvent>,
    ) -> Self {
        Self {
            recognition: RecognitionController::new(collaborators.engine, config, loopback.clone()),
            playback: PlaybackMonitor::new(),
            finalizer: SilenceFinalizer::new(config, loopback.clone()),
            gate: PermissionGate::new(collaborators.permissions, event_tx.clone()),
            sink: collaborators.sink,
            phrases: ControlPhrases::from_config(config),
            processing: false,
            input: String::new(),
            listening_held: false,
            input_clear_delay: config.input_clear_delay,
            clear_generation: 0,
            clear_timer: None,
            loopback,
            event_tx,
        }
    }

    pub fn recognition_state(&self) -> RecognitionState {
        self.recognition.state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_listening_held(&self) -> bool {
        self.listening_held
    }

    /// Run the session, processing messages until the queue closes
    pub async fn run(&mut self, mut rx: mpsc::Receiver<Message>) {
        info!("voice session started");
        self.initialize();

        while let Some(message) = rx.recv().await {
            self.handle(message);
        }

        self.shutdown();
        info!("voice session stopped");
    }

    /// Initial permission check and start
    pub fn initialize(&mut self) {
        if !self.recognition.is_supported() {
            warn!("speech recognition not supported");
            self.announce(Status::Unsupported);
            return;
        }

        let before = self.flags();
        self.request_start(StartReason::Startup);
        self.settle(before);
    }

    /// Cancel timers and stop any running session
    pub fn shutdown(&mut self) {
        let before = self.flags();
        self.finalizer.cancel();
        self.clear_timer = None;
        self.recognition.stop();
        self.settle(before);
    }

    /// Process one message
    pub fn handle(&mut self, message: Message) {
        let before = self.flags();

        match message {
            Message::RecognitionStarted => self.on_recognition_started(),
            Message::RecognitionResult(batch) => self.on_recognition_result(batch),
            Message::RecognitionEnded => self.on_recognition_ended(),
            Message::RecognitionError { code } => self.on_recognition_error(code),
            Message::Playback(signal) => self.on_playback(signal),
            Message::TextInput(text) => self.on_text_input(text),
            Message::SubmitText => self.on_submit_text(),
            Message::EnableMicrophone => self.on_enable_microphone(),
            Message::CapabilityChecked { intent, capability } => {
                self.on_capability_checked(intent, capability)
            }
            Message::PermissionResolved(capability) => self.on_permission_resolved(capability),
            Message::RetryElapsed { intent } => {
                if let Some(intent) = self.recognition.retry_elapsed(intent, self.playback.state()) {
                    self.check_capability_for(intent);
                }
            }
            Message::SilenceElapsed { generation } => self.on_silence_elapsed(generation),
            Message::ClearInput { generation } => {
                if generation == self.clear_generation && self.clear_timer.take().is_some() {
                    debug!("input cleared after submission");
                    self.set_input(String::new());
                }
            }
        }

        self.settle(before);
    }

    fn on_recognition_started(&mut self) {
        if self.recognition.on_started(self.playback.state()) {
            info!("speech recognition listening");
            self.announce(Status::Listening);
        }
    }

    fn on_recognition_result(&mut self, batch: ResultBatch) {
        if self.playback.is_playing() {
            debug!("ignoring speech recognition results during audio playback");
            return;
        }
        if self.listening_held {
            debug!("ignoring speech recognition results while listening is held");
            return;
        }

        let update = batch.transcript();
        self.set_input(update.display().to_string());

        match self.finalizer.on_transcript_update(&update, self.processing) {
            Verdict::Terminate => {
                self.recognition.stop();
                self.listening_held = true;
                self.set_input(String::new());
                info!("recognition stopped due to termination phrase");
                self.announce(Status::StoppedByPhrase {
                    resume_phrase: self.phrases.resume_phrase().to_string(),
                });
            }
            Verdict::Armed | Verdict::Ignored => {}
        }
    }

    fn on_recognition_ended(&mut self) {
        self.recognition.on_ended();
        self.set_processing(false);
        info!(playback = %self.playback.state(), "recognition ended");

        if self.playback.is_playing() {
            return;
        }
        if self.listening_held {
            debug!("listening held, not restarting");
            return;
        }
        self.request_start(StartReason::AfterSessionEnd);
    }

    fn on_recognition_error(&mut self, code: String) {
        self.recognition.on_error(&code);

        if self.listening_held {
            debug!(code = %code, "recognition error while listening held");
            return;
        }

        self.announce(Status::RecognitionError { code });
        if !self.playback.is_playing() {
            self.request_start(StartReason::AfterRecognitionError);
        }
    }

    fn on_playback(&mut self, signal: PlaybackSignal) {
        match signal {
            PlaybackSignal::Play => {
                self.playback.on_play_start();
                self.finalizer.cancel();
                if self.recognition.stop() {
                    info!("recognition stopped during audio playback");
                }
                self.announce(Status::PlayingResponse);
            }
            PlaybackSignal::Ended | PlaybackSignal::Error => {
                if signal == PlaybackSignal::Error {
                    self.playback.on_play_error();
                } else {
                    self.playback.on_play_end();
                }
                self.set_processing(false);
                self.clear_input();

                if signal == PlaybackSignal::Error {
                    self.announce(Status::PlaybackFailed);
                }

                if self.listening_held {
                    debug!("listening held, not resuming after playback");
                } else {
                    self.request_start(StartReason::AfterPlayback);
                }
            }
        }
    }

    fn on_text_input(&mut self, text: String) {
        if self.phrases.is_resume(&text) && !self.recognition.is_active() {
            info!("recognition resumed via resume phrase");
            self.listening_held = false;
            self.clear_input();
            self.request_start(StartReason::ResumePhrase);
            return;
        }
        self.set_input(text);
    }

    fn on_submit_text(&mut self) {
        if self.processing {
            debug!("submission already in flight, ignoring submit");
            return;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.finalizer.cancel();
        self.submit(text);
    }

    fn on_enable_microphone(&mut self) {
        let gate = self.gate.clone();
        let tx = self.loopback.clone();
        tokio::spawn(async move {
            let capability = gate.request_capability().await;
            if tx.send(Message::PermissionResolved(capability)).await.is_err() {
                debug!("session closed before permission request resolved");
            }
        });
    }

    fn on_permission_resolved(&mut self, capability: Capability) {
        if !capability.is_granted() {
            return;
        }
        info!("microphone access granted");
        self.listening_held = false;
        self.announce(Status::PermissionGranted);
        self.request_start(StartReason::PermissionGranted);
    }

    fn on_capability_checked(&mut self, intent: u64, capability: Capability) {
        match self.recognition.commit(intent, capability, self.playback.state()) {
            StartOutcome::Started => self.announce(Status::Listening),
            StartOutcome::NotPermitted {
                capability: Capability::Denied,
                reason,
            } => {
                if reason == StartReason::Startup {
                    self.announce(Status::EnableMicrophone);
                } else {
                    self.announce(Status::PermissionDenied);
                }
            }
            StartOutcome::NotPermitted { .. } => {
                // A failed check already surfaced its own diagnostic
                if !self.gate.last_check_failed() {
                    self.announce(Status::EnableMicrophone);
                }
            }
            StartOutcome::Exhausted => self.announce(Status::StartFailed),
            StartOutcome::Stale | StartOutcome::Superseded | StartOutcome::RetryScheduled { .. } => {}
        }
    }

    fn on_silence_elapsed(&mut self, generation: u64) {
        let Some(text) = self.finalizer.on_elapsed(generation) else {
            return;
        };
        if self.processing || self.playback.is_playing() {
            debug!(
                processing = self.processing,
                playback = %self.playback.state(),
                "silence elapsed but session busy, not submitting"
            );
            return;
        }
        self.submit(text);
    }

    /// Begin a start intent and kick off its capability check
    fn request_start(&mut self, reason: StartReason) {
        if let Some(intent) = self.recognition.begin(reason, self.playback.state()) {
            self.check_capability_for(intent);
        }
    }

    fn check_capability_for(&self, intent: StartIntent) {
        let gate = self.gate.clone();
        let tx = self.loopback.clone();
        tokio::spawn(async move {
            let capability = gate.check_capability().await;
            let message = Message::CapabilityChecked {
                intent: intent.id,
                capability,
            };
            if tx.send(message).await.is_err() {
                debug!(intent = intent.id, "session closed before capability check resolved");
            }
        });
    }

    fn submit(&mut self, text: String) {
        self.set_processing(true);
        self.set_input(text.clone());

        match self.sink.submit(&text) {
            Ok(()) => {
                info!(chars = text.chars().count(), "submitting query");
                self.emit(VoiceEvent::UtteranceSubmitted { text });
                self.clear_generation += 1;
                self.clear_timer = Some(TimerHandle::schedule(
                    self.input_clear_delay,
                    self.loopback.clone(),
                    Message::ClearInput {
                        generation: self.clear_generation,
                    },
                ));
            }
            Err(e) => {
                warn!(error = %e, "utterance submission failed");
                self.set_processing(false);
                self.announce(Status::SubmitFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn clear_input(&mut self) {
        self.clear_timer = None;
        self.set_input(String::new());
    }

    fn set_input(&mut self, text: String) {
        if self.input != text {
            self.input = text;
            self.emit(VoiceEvent::InputChanged {
                text: self.input.clone(),
            });
        }
    }

    fn set_processing(&mut self, processing: bool) {
        self.processing = processing;
    }

    fn announce(&self, status: Status) {
        debug!(%status, "status");
        self.emit(VoiceEvent::status(status));
    }

    fn emit(&self, event: VoiceEvent) {
        // No subscribers is normal before a front-end attaches
        let _ = self.event_tx.send(event);
    }

    fn flags(&self) -> Flags {
        Flags {
            recognition: self.recognition.state(),
            playback: self.playback.state(),
            processing: self.processing,
        }
    }

    /// Broadcast what changed while handling one message
    fn settle(&self, before: Flags) {
        let after = self.flags();

        debug_assert!(
            !(after.recognition == RecognitionState::Active && after.playback.is_playing()),
            "recognition active during playback"
        );

        if before.recognition != after.recognition {
            info!(from = %before.recognition, to = %after.recognition, "recognition state transition");
            self.emit(VoiceEvent::RecognitionChanged {
                from: before.recognition,
                to: after.recognition,
            });
        }
        if before.playback != after.playback {
            self.emit(VoiceEvent::PlaybackChanged {
                state: after.playback,
            });
        }
        if before.processing != after.processing {
            debug!(processing = after.processing, "processing flag changed");
            self.emit(VoiceEvent::ProcessingChanged {
                processing: after.processing,
            });
        }
    }
}
