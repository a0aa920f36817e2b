//! Security events: what the manager reports, and where it can report to.
//!
//! Every login, logout, refresh and lockout produces a [`SecurityEvent`].
//! Events go to a [`SecurityEventLog`] sink that must never block or fail
//! the operation that produced them: `emit` is synchronous, and whatever
//! error it returns is logged at `debug` and dropped.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::EventLogError;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginFailure,
    /// A login was rejected locally because of an active lockout.
    LoginBlocked,
    /// Too many failures; a lockout window opened.
    AccountLocked,
    /// A lockout window closed and the counter was reset.
    LockoutExpired,
    RegisterSuccess,
    RegisterFailure,
    Logout,
    TokenRefreshSuccess,
    TokenRefreshFailure,
    /// The session was ended for inactivity.
    SessionTimeout,
    /// A persisted session was loaded at startup.
    SessionRestored,
}

impl SecurityEventKind {
    /// The snake_case name used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::LoginBlocked => "login_blocked",
            Self::AccountLocked => "account_locked",
            Self::LockoutExpired => "lockout_expired",
            Self::RegisterSuccess => "register_success",
            Self::RegisterFailure => "register_failure",
            Self::Logout => "logout",
            Self::TokenRefreshSuccess => "token_refresh_success",
            Self::TokenRefreshFailure => "token_refresh_failure",
            Self::SessionTimeout => "session_timeout",
            Self::SessionRestored => "session_restored",
        }
    }
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a security reviewer should care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// What happened.
    pub kind: SecurityEventKind,
    /// Event-specific details (user id, attempt count, reason, ...).
    pub data: serde_json::Value,
    /// When it happened, per the manager's clock.
    pub timestamp: SystemTime,
    /// How serious it is.
    pub severity: Severity,
    /// Whether the underlying operation succeeded.
    pub success: bool,
}

impl SecurityEvent {
    /// Creates an event.
    pub fn new(
        kind: SecurityEventKind,
        severity: Severity,
        success: bool,
        data: serde_json::Value,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            kind,
            data,
            timestamp,
            severity,
            success,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// An append-only, fire-and-forget destination for security events.
///
/// Implementations must return promptly: no network round-trips, no
/// waiting on locks held across I/O. Buffer and ship elsewhere if needed.
pub trait SecurityEventLog: Send + Sync + 'static {
    /// Records `event`.
    fn emit(&self, event: SecurityEvent) -> Result<(), EventLogError>;
}

impl<T: SecurityEventLog> SecurityEventLog for Arc<T> {
    fn emit(&self, event: SecurityEvent) -> Result<(), EventLogError> {
        (**self).emit(event)
    }
}

/// Writes events as structured `tracing` records under the
/// `liftguard::security` target. Low severity logs at `info`, medium at
/// `warn`, high and critical at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

impl SecurityEventLog for TracingEventLog {
    fn emit(&self, event: SecurityEvent) -> Result<(), EventLogError> {
        let kind = event.kind.as_str();
        let data = event.data.to_string();
        match event.severity {
            Severity::Low => tracing::info!(
                target: "liftguard::security",
                kind, success = event.success, %data, "security event"
            ),
            Severity::Medium => tracing::warn!(
                target: "liftguard::security",
                kind, success = event.success, %data, "security event"
            ),
            Severity::High | Severity::Critical => tracing::error!(
                target: "liftguard::security",
                kind, success = event.success, severity = ?event.severity, %data,
                "security event"
            ),
        }
        Ok(())
    }
}

/// Forwards events into a bounded channel for an async consumer
/// (e.g. a task that batches them to an audit endpoint).
///
/// Uses `try_send`, so a full buffer drops the event instead of blocking.
#[derive(Debug, Clone)]
pub struct ChannelEventLog {
    tx: mpsc::Sender<SecurityEvent>,
}

impl ChannelEventLog {
    /// Creates a sink and the receiver its events arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SecurityEventLog for ChannelEventLog {
    fn emit(&self, event: SecurityEvent) -> Result<(), EventLogError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EventLogError::Full,
            mpsc::error::TrySendError::Closed(_) => EventLogError::Closed,
        })
    }
}

/// Keeps every event in memory. Handy for tests and for an in-app
/// "recent security activity" screen.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.lock().clone()
    }

    /// The kinds recorded so far, in order.
    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.lock().iter().map(|e| e.kind).collect()
    }

    /// How many events of `kind` were recorded.
    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// The most recent event of `kind`.
    pub fn last(&self, kind: SecurityEventKind) -> Option<SecurityEvent> {
        self.lock().iter().rev().find(|e| e.kind == kind).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SecurityEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SecurityEventLog for MemoryEventLog {
    fn emit(&self, event: SecurityEvent) -> Result<(), EventLogError> {
        self.lock().push(event);
        Ok(())
    }
}
