//! Session types: the authenticated context of a logged-in user.
//!
//! A session tracks:
//! - WHO is logged in (`user`)
//! - WHICH tokens prove it (`access_token`, `refresh_token`)
//! - WHEN the access token stops working (`expires_at`)
//! - WHEN the user last did something (`last_activity`)

use std::fmt;
use std::time::{Duration, SystemTime};

use liftguard_store::{SessionMetadata, TokenPair};
use liftguard_token::TokenClaims;

use crate::UserProfile;

/// A logged-in user's session.
///
/// Owned by the [`SessionManager`](crate::SessionManager); what callers get
/// back from `login`/`session()` is a snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for API requests.
    pub access_token: String,
    /// Token exchanged for a new pair when the access token expires.
    pub refresh_token: String,
    /// When the session began (login/registration time).
    pub issued_at: SystemTime,
    /// When the access token expires. `None` if the token couldn't be
    /// decoded; such a session is always treated as expiring.
    pub expires_at: Option<SystemTime>,
    /// The logged-in user.
    pub user: UserProfile,
    /// Stable identifier of this install.
    pub device_id: String,
    /// Last user interaction reported by the host.
    pub last_activity: SystemTime,
}

impl Session {
    /// Backend id of the logged-in user.
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// The access token's expiry as claims, if it could be read.
    pub fn claims(&self) -> Option<TokenClaims> {
        self.expires_at.map(TokenClaims::expiring_at)
    }

    /// `true` when the access token is within `buffer` of expiring (see
    /// [`TokenClaims::expires_within`]), or its expiry is unknown.
    pub fn is_expiring(&self, now: SystemTime, buffer: Duration) -> bool {
        self.claims()
            .is_none_or(|claims| claims.expires_within(now, buffer))
    }

    /// Time since the last reported activity, zero if the clock went back.
    pub fn idle_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_activity)
            .unwrap_or(Duration::ZERO)
    }

    /// Time since the session began, zero if the clock went back.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.issued_at).unwrap_or(Duration::ZERO)
    }

    /// The token pair, for persisting.
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }

    /// Everything but the tokens, for persisting.
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            user_id: self.user.id.clone(),
            email: self.user.email.clone(),
            display_name: self.user.display_name.clone(),
            device_id: self.device_id.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            last_activity: self.last_activity,
        }
    }

    /// Rebuilds a session from its persisted halves.
    ///
    /// `expires_at` is passed separately because it's re-derived from the
    /// access token rather than trusted from storage.
    pub fn from_parts(
        tokens: TokenPair,
        metadata: SessionMetadata,
        expires_at: Option<SystemTime>,
    ) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            issued_at: metadata.issued_at,
            expires_at,
            user: UserProfile {
                id: metadata.user_id,
                email: metadata.email,
                display_name: metadata.display_name,
            },
            device_id: metadata.device_id,
            last_activity: metadata.last_activity,
        }
    }
}

/// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("device_id", &self.device_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("last_activity", &self.last_activity)
            .finish_non_exhaustive()
    }
}
