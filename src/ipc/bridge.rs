//! Session collaborators backed by an attached front-end
//!
//! The engine, the permission prompt and the submission target live in the
//! front-end; these adapters turn session commands into notifications and
//! front-end reports back into answers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::protocol::Notification;
use crate::permission::{Capability, PermissionBackend, PermissionError};
use crate::recognition::{EngineError, EngineSettings, RecognitionEngine};
use crate::state::Collaborators;
use crate::submit::{SubmitError, UtteranceSink};

/// Channel for front-end commands
///
/// Holds no receiver of its own; only subscribed clients count as attached.
pub fn command_channel(capacity: usize) -> broadcast::Sender<Notification> {
    let (commands, _) = broadcast::channel(capacity);
    commands
}

/// Session collaborators that reach the engine, the permission prompt and
/// the submission target through `commands`
///
/// Also returns the sender the IPC server feeds permission reports into.
pub fn front_end_collaborators(
    settings: EngineSettings,
    commands: &broadcast::Sender<Notification>,
) -> (Collaborators, Arc<watch::Sender<Option<Capability>>>) {
    let (permissions, reports) = BridgePermission::new(commands.clone());
    let collaborators = Collaborators {
        engine: Box::new(BridgeEngine::new(settings, commands.clone())),
        permissions: Arc::new(permissions),
        sink: Box::new(BridgeSink::new(commands.clone())),
    };
    (collaborators, reports)
}

fn attached(commands: &broadcast::Sender<Notification>) -> bool {
    commands.receiver_count() > 0
}

/// Recognition engine running in the front-end
pub struct BridgeEngine {
    settings: EngineSettings,
    commands: broadcast::Sender<Notification>,
}

impl BridgeEngine {
    pub fn new(settings: EngineSettings, commands: broadcast::Sender<Notification>) -> Self {
        Self { settings, commands }
    }
}

impl RecognitionEngine for BridgeEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        if !attached(&self.commands) {
            return Err(EngineError::Unavailable("no front-end subscribed".to_string()));
        }
        self.commands
            .send(Notification::start_recognition(&self.settings))
            .map_err(|_| EngineError::Unavailable("front-end detached".to_string()))?;
        debug!(language = %self.settings.language, "start recognition sent");
        Ok(())
    }

    fn stop(&mut self) {
        if self.commands.send(Notification::StopRecognition).is_err() {
            debug!("stop recognition with no front-end attached");
        }
    }
}

/// Microphone authorization as reported by the front-end
pub struct BridgePermission {
    reports: watch::Receiver<Option<Capability>>,
    commands: broadcast::Sender<Notification>,
}

impl BridgePermission {
    /// Returns the backend and the sender the IPC server feeds reports into
    pub fn new(commands: broadcast::Sender<Notification>) -> (Self, Arc<watch::Sender<Option<Capability>>>) {
        let (report_tx, reports) = watch::channel(None);
        (Self { reports, commands }, Arc::new(report_tx))
    }
}

#[async_trait]
impl PermissionBackend for BridgePermission {
    async fn query(&self) -> Result<Capability, PermissionError> {
        let reported = *self.reports.borrow();
        reported.ok_or(PermissionError::Unreported)
    }

    async fn request(&self) -> Result<Capability, PermissionError> {
        if !attached(&self.commands) {
            return Err(PermissionError::NoFrontend);
        }

        let mut reports = self.reports.clone();
        reports.borrow_and_update();
        self.commands
            .send(Notification::PromptPermission)
            .map_err(|_| PermissionError::NoFrontend)?;
        info!("permission prompt sent to front-end");

        loop {
            reports
                .changed()
                .await
                .map_err(|_| PermissionError::Dismissed)?;
            let reported = *reports.borrow_and_update();
            match reported {
                Some(capability @ (Capability::Granted | Capability::Denied)) => {
                    return Ok(capability)
                }
                _ => debug!("permission still undetermined, waiting"),
            }
        }
    }
}

/// Hands utterances to the front-end's form submission
pub struct BridgeSink {
    commands: broadcast::Sender<Notification>,
}

impl BridgeSink {
    pub fn new(commands: broadcast::Sender<Notification>) -> Self {
        Self { commands }
    }
}

impl UtteranceSink for BridgeSink {
    fn submit(&mut self, text: &str) -> Result<(), SubmitError> {
        if !attached(&self.commands) {
            return Err(SubmitError::NoFrontend);
        }
        self.commands
            .send(Notification::SubmitUtterance {
                text: text.to_string(),
            })
            .map(|_| ())
            .map_err(|_| SubmitError::NoFrontend)
    }
}
