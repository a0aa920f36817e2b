//! The session manager: one logged-in user, their tokens and their lockout.
//!
//! This is the central piece of liftguard. It's responsible for:
//! - Logging in and registering through the [`AuthGateway`]
//! - Counting failed logins and enforcing the lockout window
//! - Persisting the session so it survives an app restart
//! - Handing out a valid access token, refreshing it when it's close to
//!   expiry (at most one refresh in flight, however many callers ask)
//! - Ending the session on logout, refresh failure or inactivity
//! - Running the background monitor while someone is logged in
//!
//! # Concurrency
//!
//! [`SessionManager`] is a cheap `Clone` handle over shared state, so UI
//! code, the HTTP client and the monitor task can all hold one. Every
//! operation that changes the session or the lockout state runs under one
//! async mutation lock, so they apply in a single order. Reads take a short
//! synchronous lock and never wait on I/O.
//!
//! ```text
//! login() ──→ [Authenticated] ──get_valid_access_token()──→ token
//!   │               │    ▲                  │ (expiring)
//!   │ failure       │    └──── refresh() ◀──┘
//!   ▼               │              │ failure
//! [LockedOut]       ▼              ▼
//!   (after window) logout() / idle timeout / refresh failure
//!                         │
//!                         ▼
//!                  [Unauthenticated]
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use futures_util::FutureExt;
use liftguard_monitor::{MonitorHandle, TickInfo};
use liftguard_store::TokenStore;
use liftguard_token::{JwtInspector, TokenInspector};
use rand::Rng;
use serde_json::json;
use tokio::task::JoinError;
use tracing::{debug, error, info, trace, warn};

use crate::lockout::{FailureOutcome, Reconciliation};
use crate::refresh::RefreshState;
use crate::{
    AuthError, AuthGateway, Clock, Credentials, LockoutState, LoginResponse, Registration,
    SecurityEvent, SecurityEventKind, SecurityEventLog, Session, SessionConfig, Severity,
    SystemClock, UserProfile,
};

/// Secure-store key of the persisted [`LockoutState`].
pub const LOCKOUT_KEY: &str = "liftguard.lockout";

/// Secure-store key of this install's device id.
pub const DEVICE_ID_KEY: &str = "liftguard.device_id";

const MONITOR_NAME: &str = "session-monitor";

/// What [`SessionManager::initialize`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStatus {
    /// A session was restored and its access token isn't expiring.
    pub has_valid_session: bool,
    /// A lockout window is open.
    pub is_locked: bool,
    /// Failed logins carried over from the last run.
    pub failed_attempts: u32,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    UserLogout,
    RefreshFailed,
    IdleTimeout,
}

impl EndReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::UserLogout => "user_logout",
            Self::RefreshFailed => "refresh_failed",
            Self::IdleTimeout => "idle_timeout",
        }
    }

    /// Whether the backend should be told. A failed refresh means the
    /// backend already considers the session dead.
    fn revokes_remotely(self) -> bool {
        !matches!(self, Self::RefreshFailed)
    }
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    /// Bumped every time `session` is replaced or removed, so a refresh
    /// that started against an older session can tell.
    generation: u64,
    lockout: LockoutState,
}

struct Core<G, S, L> {
    gateway: G,
    store: S,
    events: L,
    inspector: Arc<dyn TokenInspector>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<State>,
    /// Serializes everything that changes `state`.
    mutation: tokio::sync::Mutex<()>,
    refresh: Mutex<RefreshState>,
    next_refresh_id: AtomicU64,
    monitor: Mutex<Option<MonitorHandle>>,
}

/// Owns the authentication lifecycle of one user on one device.
///
/// Generic over the three seams a host provides: the identity backend
/// (`G`), persisted storage (`S`) and the security event sink (`L`).
///
/// # Example
///
/// ```ignore
/// let manager = SessionManager::builder(gateway, store, TracingEventLog)
///     .config(SessionConfig::default())
///     .build();
/// manager.initialize().await?;
/// manager.login(&Credentials::new("lifter@gym.io", "hunter22")).await?;
/// let token = manager.get_valid_access_token().await;
/// ```
pub struct SessionManager<G, S, L> {
    core: Arc<Core<G, S, L>>,
}

impl<G, S, L> Clone for SessionManager<G, S, L> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder<G, S, L> {
    gateway: G,
    store: S,
    events: L,
    config: SessionConfig,
    inspector: Arc<dyn TokenInspector>,
    clock: Arc<dyn Clock>,
}

impl<G, S, L> SessionManagerBuilder<G, S, L>
where
    G: AuthGateway,
    S: TokenStore,
    L: SecurityEventLog,
{
    /// Sets the configuration. Out-of-range values are clamped.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default [`JwtInspector`].
    pub fn inspector(mut self, inspector: impl TokenInspector) -> Self {
        self.inspector = Arc::new(inspector);
        self
    }

    /// Replaces the wall clock. Tests pass a
    /// [`ManualClock`](crate::ManualClock).
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the manager. Nothing is loaded until
    /// [`initialize`](SessionManager::initialize).
    pub fn build(self) -> SessionManager<G, S, L> {
        SessionManager {
            core: Arc::new(Core {
                gateway: self.gateway,
                store: self.store,
                events: self.events,
                inspector: self.inspector,
                clock: self.clock,
                config: self.config.validated(),
                state: Mutex::new(State::default()),
                mutation: tokio::sync::Mutex::new(()),
                refresh: Mutex::new(RefreshState::Idle),
                next_refresh_id: AtomicU64::new(1),
                monitor: Mutex::new(None),
            }),
        }
    }
}

impl<G, S, L> SessionManager<G, S, L>
where
    G: AuthGateway,
    S: TokenStore,
    L: SecurityEventLog,
{
    /// Creates a manager with the default inspector and system clock.
    pub fn new(gateway: G, store: S, events: L, config: SessionConfig) -> Self {
        Self::builder(gateway, store, events).config(config).build()
    }

    /// Starts building a manager.
    pub fn builder(gateway: G, store: S, events: L) -> SessionManagerBuilder<G, S, L> {
        SessionManagerBuilder {
            gateway,
            store,
            events,
            config: SessionConfig::default(),
            inspector: Arc::new(JwtInspector),
            clock: Arc::new(SystemClock),
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Loads the persisted lockout state and session. Makes no network
    /// calls.
    ///
    /// A lockout window that elapsed while the app was closed is reset; one
    /// that ends implausibly far in the future is clamped. A restored
    /// session starts the background monitor.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the store can't be read.
    pub async fn initialize(&self) -> Result<InitStatus, AuthError> {
        let guard = self.core.mutation.lock().await;
        let now = self.now();

        let mut lockout = self.load_lockout().await?;
        match lockout.reconcile(now, &self.core.config) {
            Reconciliation::Unchanged => {}
            Reconciliation::Expired => {
                info!("lockout window elapsed while closed, counter reset");
                self.emit(
                    SecurityEventKind::LockoutExpired,
                    Severity::Low,
                    true,
                    json!({ "at_startup": true }),
                );
                self.persist_lockout(&lockout).await;
            }
            adjusted => {
                warn!(?adjusted, "persisted lockout state adjusted");
                self.persist_lockout(&lockout).await;
            }
        }

        let restored = self.load_session().await?;
        let has_valid_session = restored
            .as_ref()
            .is_some_and(|s| !s.is_expiring(now, self.core.config.refresh_buffer()));

        if let Some(session) = &restored {
            info!(user_id = %session.user_id(), has_valid_session, "session restored");
            self.emit(
                SecurityEventKind::SessionRestored,
                Severity::Low,
                true,
                json!({
                    "user_id": session.user_id(),
                    "device_id": session.device_id,
                    "token_valid": has_valid_session,
                }),
            );
        }

        let status = InitStatus {
            has_valid_session,
            is_locked: lockout.is_locked(now),
            failed_attempts: lockout.failed_attempts,
        };
        let authenticated = restored.is_some();
        {
            let mut state = lock(&self.core.state);
            state.lockout = lockout;
            state.session = restored;
            state.generation += 1;
        }
        drop(guard);

        if authenticated {
            self.ensure_monitor();
        }
        debug!(?status, "session manager initialized");
        Ok(status)
    }

    /// Stops the background monitor. The session itself stays persisted.
    pub async fn dispose(&self) {
        self.stop_monitor().await;
        debug!("session manager disposed");
    }

    // -----------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------

    /// Logs in with `credentials`.
    ///
    /// Malformed credentials are rejected before anything else and don't
    /// count as a failed attempt. While a lockout window is open the
    /// backend isn't contacted at all.
    ///
    /// # Errors
    /// - [`AuthError::Validation`] for malformed credentials
    /// - [`AuthError::LockedOut`] while locked, or when this failure
    ///   reached the limit
    /// - [`AuthError::Network`] / [`AuthError::InvalidCredentials`] from
    ///   the backend; both count towards the limit
    /// - [`AuthError::Storage`] if the new session couldn't be persisted
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let identifier = credentials.normalized_identifier();
        if let Err(err) = credentials.validate() {
            self.emit(
                SecurityEventKind::LoginFailure,
                Severity::Low,
                false,
                json!({ "identifier": identifier, "reason": "validation" }),
            );
            return Err(err);
        }

        let guard = self.core.mutation.lock().await;

        if let Some(remaining_secs) = self.active_lockout().await {
            warn!(%identifier, remaining_secs, "login blocked by active lockout");
            self.emit(
                SecurityEventKind::LoginBlocked,
                Severity::Low,
                false,
                json!({ "identifier": identifier, "remaining_secs": remaining_secs }),
            );
            return Err(AuthError::LockedOut { remaining_secs });
        }

        let response = match self
            .core
            .gateway
            .login(&identifier, &credentials.secret)
            .await
        {
            Ok(response) => response,
            Err(err) => return Err(self.record_login_failure(&identifier, err.into()).await),
        };

        self.reset_lockout().await;
        let session = self.establish(response).await?;
        info!(user_id = %session.user_id(), "login succeeded");
        self.emit(
            SecurityEventKind::LoginSuccess,
            Severity::Low,
            true,
            json!({ "user_id": session.user_id(), "device_id": session.device_id }),
        );
        drop(guard);

        self.ensure_monitor();
        Ok(session)
    }

    /// Creates an account and logs into it. Registration failures don't
    /// touch the lockout counter.
    ///
    /// # Errors
    /// [`AuthError::Validation`] for a malformed request, backend errors as
    /// for [`login`](Self::login), [`AuthError::Storage`] if the new
    /// session couldn't be persisted.
    pub async fn register(&self, registration: &Registration) -> Result<Session, AuthError> {
        let email = registration.email.trim().to_lowercase();
        if let Err(err) = registration.validate() {
            self.emit(
                SecurityEventKind::RegisterFailure,
                Severity::Low,
                false,
                json!({ "email": email, "reason": "validation" }),
            );
            return Err(err);
        }

        let guard = self.core.mutation.lock().await;

        let response = match self.core.gateway.register(registration).await {
            Ok(response) => response,
            Err(err) => {
                let err = AuthError::from(err);
                warn!(%email, error = %err, "registration failed");
                self.emit(
                    SecurityEventKind::RegisterFailure,
                    Severity::Medium,
                    false,
                    json!({ "email": email, "reason": failure_reason(&err) }),
                );
                return Err(err);
            }
        };

        let session = self.establish(response).await?;
        info!(user_id = %session.user_id(), "registration succeeded");
        self.emit(
            SecurityEventKind::RegisterSuccess,
            Severity::Low,
            true,
            json!({ "user_id": session.user_id(), "device_id": session.device_id }),
        );
        drop(guard);

        self.ensure_monitor();
        Ok(session)
    }

    /// Ends the session: tells the backend (best effort), wipes the
    /// persisted tokens and metadata, stops the monitor.
    ///
    /// Idempotent. Logging out with no session still clears the store and
    /// succeeds. The lockout state survives.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the store couldn't be cleared; the
    /// in-memory session is gone regardless.
    pub async fn logout(&self) -> Result<(), AuthError> {
        // The monitor job may be waiting on the mutation lock, so it has to
        // be stopped before this takes it.
        self.stop_monitor().await;
        let _guard = self.core.mutation.lock().await;
        self.end_session(EndReason::UserLogout).await
    }

    // -----------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------

    /// Returns an access token that isn't about to expire, refreshing it
    /// first if needed. `None` means the user has to sign in again.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let now = self.now();
        {
            let state = lock(&self.core.state);
            match &state.session {
                None => return None,
                Some(session) if !session.is_expiring(now, self.core.config.refresh_buffer()) => {
                    return Some(session.access_token.clone());
                }
                Some(_) => {}
            }
        }
        debug!("access token expiring, refreshing");
        self.refresh().await
    }

    /// Exchanges the refresh token for a new pair.
    ///
    /// Concurrent callers share one in-flight refresh and all get its
    /// result. On failure the session is cleared and every caller gets
    /// `None`.
    pub async fn refresh(&self) -> Option<String> {
        let handle = {
            let mut slot = lock(&self.core.refresh);
            match slot.in_flight() {
                Some(handle) => {
                    trace!("joining in-flight refresh");
                    handle
                }
                None => {
                    let id = self.core.next_refresh_id.fetch_add(1, Ordering::Relaxed);
                    let manager = self.clone();
                    let task = tokio::spawn(async move { manager.run_refresh(id).await });
                    let core = Arc::clone(&self.core);
                    let handle = async move {
                        match task.await {
                            Ok(token) => token,
                            Err(e) => {
                                error!(error = %e, "refresh task failed");
                                lock(&core.refresh).finish(id);
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = RefreshState::Refreshing {
                        id,
                        handle: handle.clone(),
                    };
                    handle
                }
            }
        };
        handle.await
    }

    /// `true` if a usable access token is available, refreshing it if
    /// needed.
    pub async fn has_valid_session(&self) -> bool {
        self.get_valid_access_token().await.is_some()
    }

    // -----------------------------------------------------------------
    // Activity
    // -----------------------------------------------------------------

    /// Ends the session if it has been idle longer than the configured
    /// timeout. Returns `true` if it did.
    pub async fn check_session_timeout(&self) -> bool {
        let Some(timeout) = self.core.config.idle_timeout() else {
            return false;
        };

        let _guard = self.core.mutation.lock().await;
        let now = self.now();
        let idle = lock(&self.core.state)
            .session
            .as_ref()
            .map(|s| (s.idle_for(now), s.user_id().to_string()));
        let Some((idle, user_id)) = idle else {
            return false;
        };
        if idle <= timeout {
            return false;
        }

        info!(%user_id, idle_secs = idle.as_secs(), "session idle too long, ending it");
        self.emit(
            SecurityEventKind::SessionTimeout,
            Severity::Medium,
            true,
            json!({ "user_id": user_id, "idle_secs": idle.as_secs() }),
        );
        if let Err(e) = self.end_session(EndReason::IdleTimeout).await {
            warn!(error = %e, "failed to clear store after idle timeout");
        }
        true
    }

    /// Records user interaction now. No-op without a session.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the updated metadata couldn't be persisted.
    pub async fn update_last_activity(&self) -> Result<(), AuthError> {
        let _guard = self.core.mutation.lock().await;
        let now = self.now();
        let metadata = {
            let mut state = lock(&self.core.state);
            match state.session.as_mut() {
                Some(session) => {
                    session.last_activity = now;
                    session.metadata()
                }
                None => return Ok(()),
            }
        };
        self.core.store.set_session_metadata(&metadata).await?;
        trace!("activity recorded");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// `true` if there's a session whose access token isn't expiring.
    /// Never refreshes; see [`has_valid_session`](Self::has_valid_session).
    pub fn is_authenticated(&self) -> bool {
        let now = self.now();
        lock(&self.core.state)
            .session
            .as_ref()
            .is_some_and(|s| !s.is_expiring(now, self.core.config.refresh_buffer()))
    }

    /// A snapshot of the current session.
    pub fn session(&self) -> Option<Session> {
        lock(&self.core.state).session.clone()
    }

    /// The logged-in user.
    pub fn current_user(&self) -> Option<UserProfile> {
        lock(&self.core.state)
            .session
            .as_ref()
            .map(|s| s.user.clone())
    }

    /// `true` while a lockout window is open.
    pub fn is_locked_out(&self) -> bool {
        let now = self.now();
        lock(&self.core.state).lockout.is_locked(now)
    }

    /// Time left in the lockout window.
    pub fn remaining_lockout(&self) -> Option<Duration> {
        let now = self.now();
        lock(&self.core.state).lockout.remaining(now)
    }

    /// A snapshot of the failed-login bookkeeping.
    pub fn lockout_state(&self) -> LockoutState {
        lock(&self.core.state).lockout.clone()
    }

    /// `true` while the background monitor task is running.
    pub fn is_monitoring(&self) -> bool {
        lock(&self.core.monitor)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// `true` while a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.core.refresh).is_refreshing()
    }

    /// The effective (clamped) configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn now(&self) -> SystemTime {
        self.core.clock.now()
    }

    fn emit(
        &self,
        kind: SecurityEventKind,
        severity: Severity,
        success: bool,
        data: serde_json::Value,
    ) {
        let event = SecurityEvent::new(kind, severity, success, data, self.now());
        if let Err(e) = self.core.events.emit(event) {
            debug!(%kind, error = %e, "security event dropped");
        }
    }

    /// Expiry of `access_token`, or `None` (always expiring) if it can't be
    /// decoded.
    fn expiry_of(&self, access_token: &str) -> Option<SystemTime> {
        match self.core.inspector.decode(access_token) {
            Ok(claims) => Some(claims.expires_at),
            Err(e) => {
                warn!(error = %e, "access token expiry unreadable, treating it as expired");
                None
            }
        }
    }

    /// Resets an elapsed lockout, then reports the seconds left if one is
    /// still open. Caller holds the mutation lock.
    async fn active_lockout(&self) -> Option<u64> {
        let now = self.now();
        let (expired, snapshot, remaining) = {
            let mut state = lock(&self.core.state);
            let expired = state.lockout.expire_if_elapsed(now);
            let remaining = state
                .lockout
                .is_locked(now)
                .then(|| state.lockout.remaining_secs(now));
            (expired, state.lockout.clone(), remaining)
        };
        if expired {
            info!("lockout window elapsed, counter reset");
            self.emit(
                SecurityEventKind::LockoutExpired,
                Severity::Low,
                true,
                json!({ "at_startup": false }),
            );
            self.persist_lockout(&snapshot).await;
        }
        remaining
    }

    /// Counts a failed login and returns the error the caller should see.
    /// Caller holds the mutation lock.
    async fn record_login_failure(&self, identifier: &str, err: AuthError) -> AuthError {
        let now = self.now();
        let (outcome, snapshot) = {
            let mut state = lock(&self.core.state);
            let outcome = state.lockout.record_failure(now, &self.core.config);
            (outcome, state.lockout.clone())
        };
        self.persist_lockout(&snapshot).await;

        let reason = failure_reason(&err);
        self.emit(
            SecurityEventKind::LoginFailure,
            Severity::Medium,
            false,
            json!({
                "identifier": identifier,
                "reason": reason,
                "failed_attempts": snapshot.failed_attempts,
            }),
        );

        match outcome {
            FailureOutcome::Counted {
                attempts,
                remaining,
            } => {
                info!(%identifier, attempts, remaining, reason, "login failed");
                err
            }
            FailureOutcome::Locked { .. } => {
                let remaining_secs = snapshot.remaining_secs(now);
                warn!(
                    %identifier,
                    attempts = snapshot.failed_attempts,
                    lockout_secs = remaining_secs,
                    "too many failed logins, locking out"
                );
                self.emit(
                    SecurityEventKind::AccountLocked,
                    Severity::High,
                    false,
                    json!({
                        "identifier": identifier,
                        "failed_attempts": snapshot.failed_attempts,
                        "lockout_secs": remaining_secs,
                    }),
                );
                AuthError::LockedOut { remaining_secs }
            }
        }
    }

    async fn reset_lockout(&self) {
        let had_failures = {
            let mut state = lock(&self.core.state);
            let had_failures = state.lockout != LockoutState::default();
            state.lockout.reset();
            had_failures
        };
        if had_failures {
            if let Err(e) = self.core.store.remove_secure(LOCKOUT_KEY).await {
                warn!(error = %e, "failed to clear persisted lockout state");
            }
        }
    }

    async fn load_lockout(&self) -> Result<LockoutState, AuthError> {
        let Some(raw) = self.core.store.get_secure(LOCKOUT_KEY).await? else {
            return Ok(LockoutState::default());
        };
        match serde_json::from_str(&raw) {
            Ok(lockout) => Ok(lockout),
            Err(e) => {
                warn!(error = %e, "persisted lockout state unreadable, resetting it");
                Ok(LockoutState::default())
            }
        }
    }

    /// Best effort: the in-memory state stays authoritative for this run.
    async fn persist_lockout(&self, lockout: &LockoutState) {
        let result = match serde_json::to_string(lockout) {
            Ok(json) => self.core.store.set_secure(LOCKOUT_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist lockout state");
        }
    }

    /// Rebuilds the persisted session, if both halves are there. A lone
    /// half is discarded.
    async fn load_session(&self) -> Result<Option<Session>, AuthError> {
        let tokens = self.core.store.get_tokens().await?;
        let metadata = self.core.store.get_session_metadata().await?;
        match (tokens, metadata) {
            (Some(tokens), Some(metadata)) => {
                let expires_at = self.expiry_of(&tokens.access_token);
                Ok(Some(Session::from_parts(tokens, metadata, expires_at)))
            }
            (None, None) => Ok(None),
            (tokens, _) => {
                warn!(
                    has_tokens = tokens.is_some(),
                    "incomplete persisted session, discarding it"
                );
                self.core.store.clear().await?;
                Ok(None)
            }
        }
    }

    async fn persist_session(&self, session: &Session) -> Result<(), AuthError> {
        self.core.store.set_tokens(&session.tokens()).await?;
        self.core
            .store
            .set_session_metadata(&session.metadata())
            .await?;
        Ok(())
    }

    /// Builds, persists and installs the session for a successful login or
    /// registration. Caller holds the mutation lock.
    async fn establish(&self, response: LoginResponse) -> Result<Session, AuthError> {
        let now = self.now();
        let device_id = self.device_id().await?;
        let expires_at = self.expiry_of(&response.tokens.access_token);
        let session = Session {
            access_token: response.tokens.access_token,
            refresh_token: response.tokens.refresh_token,
            issued_at: now,
            expires_at,
            user: response.user,
            device_id,
            last_activity: now,
        };
        self.persist_session(&session).await?;

        let mut state = lock(&self.core.state);
        state.session = Some(session.clone());
        state.generation += 1;
        Ok(session)
    }

    /// This install's id, generated and persisted on first use.
    async fn device_id(&self) -> Result<String, AuthError> {
        if let Some(id) = self.core.store.get_secure(DEVICE_ID_KEY).await? {
            if !id.is_empty() {
                return Ok(id);
            }
        }
        let id = generate_device_id();
        self.core.store.set_secure(DEVICE_ID_KEY, &id).await?;
        debug!(device_id = %id, "generated device id");
        Ok(id)
    }

    /// Drops the session from memory and storage. Caller holds the
    /// mutation lock.
    async fn end_session(&self, reason: EndReason) -> Result<(), AuthError> {
        self.cancel_monitor();

        let ended = {
            let mut state = lock(&self.core.state);
            let ended = state.session.take();
            if ended.is_some() {
                state.generation += 1;
            }
            ended
        };

        if let Some(session) = &ended {
            if reason.revokes_remotely() {
                if let Err(e) = self.core.gateway.logout(&session.access_token).await {
                    debug!(error = %e, "backend logout failed, clearing locally anyway");
                }
            }
        }

        let cleared = self.core.store.clear().await;

        match &ended {
            Some(session) => {
                let duration_secs = session.age(self.now()).as_secs();
                info!(
                    user_id = %session.user_id(),
                    reason = reason.as_str(),
                    duration_secs,
                    "session ended"
                );
                self.emit(
                    SecurityEventKind::Logout,
                    Severity::Low,
                    true,
                    json!({
                        "user_id": session.user_id(),
                        "reason": reason.as_str(),
                        "duration_secs": duration_secs,
                    }),
                );
            }
            None => debug!(reason = reason.as_str(), "no session to end"),
        }

        cleared.map_err(AuthError::from)
    }

    /// Body of the spawned single-flight refresh. The exchange itself runs
    /// in a task of its own, so a panicking gateway still leaves the slot
    /// idle and the session ended.
    async fn run_refresh(&self, id: u64) -> Option<String> {
        let worker = self.clone();
        let token = match tokio::spawn(async move { worker.refresh_locked().await }).await {
            Ok(token) => token,
            Err(e) => {
                self.abandon_refresh(e).await;
                None
            }
        };
        lock(&self.core.refresh).finish(id);
        token
    }

    /// Treats a refresh that died before settling as a failed one.
    async fn abandon_refresh(&self, err: JoinError) {
        error!(error = %err, "refresh task died, ending session");
        let _guard = self.core.mutation.lock().await;

        let user_id = lock(&self.core.state)
            .session
            .as_ref()
            .map(|s| s.user_id().to_string());
        let Some(user_id) = user_id else {
            return;
        };

        self.emit(
            SecurityEventKind::TokenRefreshFailure,
            Severity::High,
            false,
            json!({ "user_id": user_id, "reason": "refresh task died" }),
        );
        if let Err(e) = self.end_session(EndReason::RefreshFailed).await {
            warn!(error = %e, "failed to clear store after refresh failure");
        }
    }

    async fn refresh_locked(&self) -> Option<String> {
        let _guard = self.core.mutation.lock().await;

        let current = {
            let state = lock(&self.core.state);
            state.session.as_ref().map(|s| {
                (
                    state.generation,
                    s.refresh_token.clone(),
                    s.user_id().to_string(),
                )
            })
        };
        let Some((generation, refresh_token, user_id)) = current else {
            debug!("no session to refresh");
            return None;
        };

        match self.core.gateway.refresh(&refresh_token).await {
            Ok(tokens) => {
                let expires_at = self.expiry_of(&tokens.access_token);
                let updated = {
                    let mut state = lock(&self.core.state);
                    let unchanged = state.generation == generation;
                    match state.session.as_mut() {
                        Some(session) if unchanged => {
                            session.access_token = tokens.access_token;
                            session.refresh_token = tokens.refresh_token;
                            session.expires_at = expires_at;
                            Some(session.clone())
                        }
                        _ => None,
                    }
                };
                let Some(updated) = updated else {
                    debug!("session changed during refresh, discarding new tokens");
                    return None;
                };

                if let Err(e) = self.persist_session(&updated).await {
                    warn!(error = %e, "refreshed tokens could not be persisted");
                }

                let now = self.now();
                let expires_in_secs = updated.claims().map(|c| c.remaining(now).as_secs());
                info!(%user_id, ?expires_in_secs, "access token refreshed");
                self.emit(
                    SecurityEventKind::TokenRefreshSuccess,
                    Severity::Low,
                    true,
                    json!({ "user_id": user_id, "expires_in_secs": expires_in_secs }),
                );
                Some(updated.access_token)
            }
            Err(err) => {
                warn!(%user_id, error = %err, "token refresh failed, ending session");
                self.emit(
                    SecurityEventKind::TokenRefreshFailure,
                    Severity::High,
                    false,
                    json!({ "user_id": user_id, "reason": err.to_string() }),
                );
                if let Err(e) = self.end_session(EndReason::RefreshFailed).await {
                    warn!(error = %e, "failed to clear store after refresh failure");
                }
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // Monitor
    // -----------------------------------------------------------------

    /// Starts the monitor unless one is already running.
    fn ensure_monitor(&self) {
        let mut slot = lock(&self.core.monitor);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        // The task must not keep the manager alive.
        let weak = Arc::downgrade(&self.core);
        let handle = liftguard_monitor::spawn(
            MONITOR_NAME,
            self.core.config.monitor_config(),
            move |tick| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(core) => {
                            let manager = SessionManager { core };
                            manager.monitor_tick(tick).await
                        }
                        None => Ok(()),
                    }
                }
            },
        );
        debug!(interval_secs = self.core.config.monitor_interval_secs, "monitor started");
        *slot = Some(handle);
    }

    /// Signals the monitor to stop without waiting for it. Safe to call
    /// from the monitor's own job.
    fn cancel_monitor(&self) {
        let handle = lock(&self.core.monitor).take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Stops the monitor and waits for its task to finish.
    async fn stop_monitor(&self) {
        let handle = lock(&self.core.monitor).take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    async fn monitor_tick(&self, tick: TickInfo) -> Result<(), AuthError> {
        if tick.overrun {
            debug!(skipped = tick.ticks_skipped, "monitor resumed after a gap");
        }
        if self.check_session_timeout().await {
            return Ok(());
        }

        let now = self.now();
        let expiring = lock(&self.core.state)
            .session
            .as_ref()
            .map(|s| s.is_expiring(now, self.core.config.refresh_buffer()));
        match expiring {
            Some(true) => {
                debug!(tick = tick.tick, "token expiring, refreshing ahead of time");
                self.refresh()
                    .await
                    .map(|_| ())
                    .ok_or(AuthError::RefreshFailed)
            }
            _ => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn failure_reason(err: &AuthError) -> &'static str {
    match err {
        AuthError::Network(_) => "network",
        AuthError::InvalidCredentials(_) => "invalid_credentials",
        AuthError::Validation(_) => "validation",
        AuthError::LockedOut { .. } => "locked_out",
        AuthError::RefreshFailed => "refresh_failed",
        AuthError::Storage(_) => "storage",
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_device_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
