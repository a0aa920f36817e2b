//! Host configuration loaded from a JSON document.

use std::path::{Path, PathBuf};

use liftguard_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::LiftguardError;

/// Everything a host configures, in one document.
///
/// Every field has a default, so `{}` is a valid config:
///
/// ```json
/// {
///   "session": { "max_failed_attempts": 5, "idle_timeout_secs": 900 },
///   "store_path": "/data/liftguard.json",
///   "log_filter": "liftguard=debug"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftguardConfig {
    /// Lockout, refresh, monitor and idle timeout settings.
    pub session: SessionConfig,

    /// Where a [`FileTokenStore`](liftguard_store::FileTokenStore) keeps its
    /// document. `None` leaves the choice of store to the host.
    pub store_path: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` isn't set. Default: `info`.
    pub log_filter: String,
}

impl Default for LiftguardConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            store_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl LiftguardConfig {
    /// Parses a JSON document. Out-of-range session values are clamped.
    ///
    /// # Errors
    /// [`LiftguardError::ConfigParse`] if the document isn't valid.
    pub fn from_json_str(json: &str) -> Result<Self, LiftguardError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    /// [`LiftguardError::ConfigIo`] if the file can't be read,
    /// [`LiftguardError::ConfigParse`] if it isn't valid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LiftguardError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| LiftguardError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Fix out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.session = self.session.validated();
        if self.log_filter.trim().is_empty() {
            self.log_filter = "info".to_string();
        }
        self
    }
}
