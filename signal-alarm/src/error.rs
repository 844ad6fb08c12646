//! Error types.
//!
//! [`CapabilityError`] covers everything that can go wrong while driving
//! platform resources (audio, wake lock, notifications). None of these are
//! fatal: the engine logs them and keeps ringing with whatever capabilities
//! remain. [`Error`] is the crate-level error for the daemon plumbing around
//! the engine (configuration, the signal store, the API client).

use std::io;

use strum::Display;

/// Platform capability the alarm tries to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    WakeLock,
    Vibration,
    Focus,
    Notification,
    Audio,
}

/// Failure to use a platform capability.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The capability does not exist on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(Capability),

    /// The user or the platform refused the capability.
    #[error("{capability} permission denied: {reason}")]
    PermissionDenied {
        capability: Capability,
        reason: String,
    },

    /// A single resource failed to start or stop.
    #[error("{resource} failed: {reason}")]
    Transient {
        resource: &'static str,
        reason: String,
    },
}

impl CapabilityError {
    pub fn transient(resource: &'static str, reason: impl ToString) -> Self {
        Self::Transient {
            resource,
            reason: reason.to_string(),
        }
    }
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Engine is no longer running")]
    EngineStopped,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
