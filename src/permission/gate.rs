//! Capability checks and interactive requests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::Capability;
use crate::events::VoiceEvent;
use crate::status::Status;

/// Errors from a permission backend
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("permission state has not been reported yet")]
    Unreported,

    #[error("no front-end attached to answer the permission prompt")]
    NoFrontend,

    #[error("permission query failed: {0}")]
    Query(String),

    #[error("permission prompt was dismissed")]
    Dismissed,
}

/// Source of microphone authorization
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Current authorization without prompting
    async fn query(&self) -> Result<Capability, PermissionError>;

    /// Show the interactive prompt and wait for the user's decision
    async fn request(&self) -> Result<Capability, PermissionError>;
}

/// Queries and requests microphone authorization
///
/// Cheap to clone; clones share the last check outcome.
#[derive(Clone)]
pub struct PermissionGate {
    backend: Arc<dyn PermissionBackend>,
    last_check_failed: Arc<AtomicBool>,
    event_tx: broadcast::Sender<VoiceEvent>,
}

impl PermissionGate {
    pub fn new(backend: Arc<dyn PermissionBackend>, event_tx: broadcast::Sender<VoiceEvent>) -> Self {
        Self {
            backend,
            last_check_failed: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// Whether the most recent check failed rather than answered
    pub fn last_check_failed(&self) -> bool {
        self.last_check_failed.load(Ordering::SeqCst)
    }

    /// Query the current capability without prompting
    ///
    /// A failed query yields `Undetermined` and surfaces a diagnostic.
    pub async fn check_capability(&self) -> Capability {
        let capability = match self.backend.query().await {
            Ok(capability) => {
                self.last_check_failed.store(false, Ordering::SeqCst);
                debug!(%capability, "microphone permission state");
                capability
            }
            Err(e) => {
                self.last_check_failed.store(true, Ordering::SeqCst);
                error!(error = %e, "error checking microphone permission");
                self.surface(Status::PermissionCheckFailed);
                Capability::Undetermined
            }
        };

        capability
    }

    /// Prompt the user for microphone access
    ///
    /// Resolves `Granted` or `Denied`. A denial surfaces a persistent
    /// call-to-action; a grant is left for the session to act on.
    pub async fn request_capability(&self) -> Capability {
        let capability = match self.backend.request().await {
            Ok(Capability::Granted) => Capability::Granted,
            Ok(other) => {
                info!(capability = %other, "microphone request not granted");
                Capability::Denied
            }
            Err(e) => {
                warn!(error = %e, "microphone permission request failed");
                Capability::Denied
            }
        };

        if capability == Capability::Denied {
            self.surface(Status::PermissionDenied);
        }

        capability
    }

    fn surface(&self, status: Status) {
        // No subscribers is normal before a front-end attaches
        let _ = self.event_tx.send(VoiceEvent::status(status));
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("last_check_failed", &self.last_check_failed())
            .finish()
    }
}
