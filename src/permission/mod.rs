//! Microphone permission gate
//!
//! Wraps a `PermissionBackend` (browser permission API, OS prompt, or the
//! IPC bridge) and reports a tri-state capability. Failures never
//! propagate: they are logged, surfaced as status, and mapped to a
//! capability value.

mod gate;

pub use gate::{PermissionBackend, PermissionError, PermissionGate};

use serde::{Deserialize, Serialize};

/// Microphone authorization as last observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Granted,
    Denied,
    /// Not decided yet (would prompt), or the query failed
    #[default]
    Undetermined,
}

impl Capability {
    pub fn is_granted(self) -> bool {
        self == Capability::Granted
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Granted => write!(f, "granted"),
            Capability::Denied => write!(f, "denied"),
            Capability::Undetermined => write!(f, "undetermined"),
        }
    }
}
