//! Extension system for apphost.
//!
//! Extensions are auxiliary subprocesses listed in the configuration. Each
//! one is spawned through the platform shell, receives a bootstrap payload
//! (port and tokens) on its stdin, and is terminated when the host shuts
//! down.

pub mod bootstrap;
pub mod manager;
pub mod registry;

pub use bootstrap::BootstrapPayload;
pub use manager::ExtensionManager;
pub use registry::{ExtensionRecord, ExtensionRegistry, TrackedProcess};

use thiserror::Error;

use crate::auth::AuthError;
use crate::process::ProcessError;

/// Errors that can occur while starting an extension.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The bootstrap payload could not be built.
    #[error("Bootstrap for extension '{id}' failed: {source}")]
    Bootstrap {
        id: String,
        #[source]
        source: AuthError,
    },

    /// The extension process could not be spawned.
    #[error("Failed to spawn extension '{id}': {source}")]
    Spawn {
        id: String,
        #[source]
        source: ProcessError,
    },

    /// The payload could not be serialized.
    #[error("Failed to serialize bootstrap payload: {0}")]
    Payload(#[from] serde_json::Error),
}
