//! Error types for the session layer.

use liftguard_store::StoreError;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
///
/// The manager fails fast: nothing here is retried internally. Callers
/// decide whether and when to try again.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credentials are malformed. Detected locally, before any network
    /// call and without touching the failed-attempt counter.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Too many failed logins; attempts are rejected until the lockout
    /// window closes.
    #[error("too many failed attempts, try again in {remaining_secs}s")]
    LockedOut {
        /// Whole seconds (rounded up) until login is allowed again.
        remaining_secs: u64,
    },

    /// The identity backend couldn't be reached. Transient.
    #[error("network error: {0}")]
    Network(String),

    /// The identity backend rejected the credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The refresh token was rejected or the refresh call failed. The
    /// session has been cleared; the user must sign in again.
    #[error("session refresh failed, sign in again")]
    RefreshFailed,

    /// Persisted state couldn't be read or written.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// A short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::LockedOut { remaining_secs } => {
                let minutes = remaining_secs.div_ceil(60);
                if minutes <= 1 {
                    "Too many failed attempts. Try again in a minute.".to_string()
                } else {
                    format!("Too many failed attempts. Try again in {minutes} minutes.")
                }
            }
            Self::Network(_) => {
                "Can't reach the server. Check your connection and try again.".to_string()
            }
            Self::InvalidCredentials(_) => "Incorrect email or password.".to_string(),
            Self::RefreshFailed => "Your session has expired. Please sign in again.".to_string(),
            Self::Storage(_) => "Couldn't save your sign-in on this device.".to_string(),
        }
    }

    /// `true` for [`AuthError::LockedOut`].
    pub fn is_locked_out(&self) -> bool {
        matches!(self, Self::LockedOut { .. })
    }
}

/// Errors reported by an [`AuthGateway`](crate::AuthGateway).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure: timeout, DNS, connection refused, 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered and said no (bad password, revoked token).
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<GatewayError> for AuthError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(msg) => Self::Network(msg),
            GatewayError::Rejected(msg) => Self::InvalidCredentials(msg),
        }
    }
}

/// Errors a [`SecurityEventLog`](crate::SecurityEventLog) sink may report.
///
/// The manager logs and discards these; they never fail an operation.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The sink's buffer is full.
    #[error("event sink is full")]
    Full,

    /// The sink's consumer is gone.
    #[error("event sink is closed")]
    Closed,

    /// Any other sink-specific failure.
    #[error("event sink failed: {0}")]
    Sink(String),
}
