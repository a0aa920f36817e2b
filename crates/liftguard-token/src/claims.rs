//! Decoded token claims and the expiry rule.

use std::time::{Duration, SystemTime};

/// The claims a client reads from an access token.
///
/// Only `expires_at` is mandatory: a token whose expiry can't be read is
/// reported as a [`DecodeError`](crate::DecodeError) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// When the token stops being accepted by the backend (`exp`).
    pub expires_at: SystemTime,

    /// When the token was issued (`iat`), if present.
    pub issued_at: Option<SystemTime>,

    /// Who the token was issued to (`sub`), if present.
    pub subject: Option<String>,
}

impl TokenClaims {
    /// Creates claims with only an expiry.
    pub fn expiring_at(expires_at: SystemTime) -> Self {
        Self {
            expires_at,
            issued_at: None,
            subject: None,
        }
    }

    /// Returns `true` if the token is within `buffer` of its expiry at
    /// `now`, i.e. `now >= expires_at - buffer`.
    ///
    /// An expiry so early that subtracting the buffer underflows the epoch
    /// counts as expiring.
    pub fn expires_within(&self, now: SystemTime, buffer: Duration) -> bool {
        match self.expires_at.checked_sub(buffer) {
            Some(threshold) => now >= threshold,
            None => true,
        }
    }

    /// Time left until expiry, saturating at zero.
    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.expires_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}
