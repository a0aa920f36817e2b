//! Persisted value types.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// The access/refresh token pair issued by the identity backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token attached to API requests.
    pub access_token: String,
    /// Long-lived token exchanged for a new pair.
    pub refresh_token: String,
}

impl TokenPair {
    /// Creates a pair from anything string-like.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Tokens are secrets; keep them out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Everything about a session except its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Backend identifier of the logged-in user.
    pub user_id: String,
    /// Email the user authenticated with.
    pub email: String,
    /// Display name, if the backend supplied one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Stable identifier of this install.
    pub device_id: String,
    /// When the session (not the current token) began.
    pub issued_at: SystemTime,
    /// Expiry of the current access token; `None` if it couldn't be read.
    #[serde(default)]
    pub expires_at: Option<SystemTime>,
    /// Last user interaction reported by the host.
    pub last_activity: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pair_debug_redacts_secrets() {
        let pair = TokenPair::new("secret-access", "secret-refresh");

        let printed = format!("{pair:?}");

        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_metadata_missing_optional_fields_deserialize() {
        // Documents written before `display_name` existed must still load.
        let json = r#"{
            "user_id": "u1",
            "email": "a@b.com",
            "device_id": "d1",
            "issued_at": {"secs_since_epoch": 10, "nanos_since_epoch": 0},
            "last_activity": {"secs_since_epoch": 20, "nanos_since_epoch": 0}
        }"#;

        let meta: SessionMetadata = serde_json::from_str(json).unwrap();

        assert_eq!(meta.display_name, None);
        assert_eq!(meta.expires_at, None);
        assert_eq!(meta.user_id, "u1");
    }
}
