//! Unified error type for liftguard.

use std::path::PathBuf;

use liftguard_session::AuthError;
use liftguard_store::StoreError;
use liftguard_token::DecodeError;

/// Top-level error that wraps every crate-specific error.
///
/// Hosts using the `liftguard` meta-crate deal with this one type; `?`
/// converts sub-crate errors through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum LiftguardError {
    /// Login, registration, refresh or logout failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Persisted state couldn't be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An access token couldn't be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The config file couldn't be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config document isn't valid JSON for [`LiftguardConfig`](crate::LiftguardConfig).
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A global `tracing` subscriber was already installed.
    #[error("telemetry init failed: {0}")]
    Telemetry(String),
}

impl LiftguardError {
    /// A short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(err) => err.user_message(),
            Self::Store(_) => "Couldn't access sign-in data on this device.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}
