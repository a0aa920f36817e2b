//! Integration tests for the session manager against a scripted backend.
//!
//! Wall time comes from a `ManualClock`, so token expiry, lockout windows
//! and idle timeouts move only when a test says so. Tests that exercise the
//! background monitor use `start_paused = true` so its interval elapses
//! instantly.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use liftguard_session::{
    AuthError, AuthGateway, Credentials, GatewayError, LOCKOUT_KEY, DEVICE_ID_KEY, LockoutState,
    LoginResponse, ManualClock, MemoryEventLog, Registration, SecurityEventKind, SessionConfig,
    SessionManager, Severity, TokenPair, TokenStore, UserProfile,
};
use liftguard_store::MemoryTokenStore;
use liftguard_token::{DecodeError, JwtInspector, TokenClaims, TokenInspector, unsigned_jwt};
use serde_json::json;

const START: u64 = 1_700_000_000;
const HOUR: u64 = 3_600;

// =========================================================================
// Mock backend
// =========================================================================

fn access_token(exp: u64, serial: usize) -> String {
    unsigned_jwt(&json!({ "exp": exp, "sub": "user-1", "serial": serial }))
}

/// Succeeds unless a failure was scripted. Tokens minted by login expire at
/// `access_exp`, tokens minted by refresh at `refreshed_exp`.
struct MockGateway {
    login_script: Mutex<VecDeque<GatewayError>>,
    register_failure: Mutex<Option<GatewayError>>,
    refresh_failure: Mutex<Option<GatewayError>>,
    refresh_delay: Mutex<Duration>,
    refresh_override: Mutex<Option<TokenPair>>,
    refresh_panics: AtomicBool,
    access_exp: AtomicU64,
    refreshed_exp: AtomicU64,
    last_refresh_token: Mutex<Option<String>>,
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            login_script: Mutex::new(VecDeque::new()),
            register_failure: Mutex::new(None),
            refresh_failure: Mutex::new(None),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_override: Mutex::new(None),
            refresh_panics: AtomicBool::new(false),
            access_exp: AtomicU64::new(START + HOUR),
            refreshed_exp: AtomicU64::new(START + 2 * HOUR),
            last_refresh_token: Mutex::new(None),
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    fn fail_next_logins(&self, err: GatewayError, times: usize) {
        let mut script = self.login_script.lock().unwrap();
        script.extend(std::iter::repeat_n(err, times));
    }

    fn fail_refresh(&self, err: GatewayError) {
        *self.refresh_failure.lock().unwrap() = Some(err);
    }

    /// The next refresh panics, like a buggy backend client would.
    fn panic_next_refresh(&self) {
        self.refresh_panics.store(true, Ordering::SeqCst);
    }

    fn delay_refresh(&self, by: Duration) {
        *self.refresh_delay.lock().unwrap() = by;
    }

    fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn mint(&self, email: &str, serial: usize) -> LoginResponse {
        LoginResponse {
            user: UserProfile {
                id: "user-1".into(),
                email: email.into(),
                display_name: Some("Ada".into()),
            },
            tokens: TokenPair::new(
                access_token(self.access_exp.load(Ordering::SeqCst), serial),
                format!("login-refresh-{serial}"),
            ),
        }
    }
}

impl AuthGateway for MockGateway {
    fn login(
        &self,
        identifier: &str,
        _secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        let serial = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.login_script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(err) => Err(err),
            None => Ok(self.mint(identifier, serial)),
        };
        async move { result }
    }

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        let serial = self.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = match self.register_failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(self.mint(&registration.email, serial)),
        };
        async move { result }
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, GatewayError>> + Send {
        let serial = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        let delay = *self.refresh_delay.lock().unwrap();
        let overridden = self.refresh_override.lock().unwrap().clone();
        let failure = self.refresh_failure.lock().unwrap().clone();
        let panics = self.refresh_panics.swap(false, Ordering::SeqCst);
        let result = match (failure, overridden) {
            (Some(err), _) => Err(err),
            (None, Some(pair)) => Ok(pair),
            (None, None) => Ok(TokenPair::new(
                access_token(self.refreshed_exp.load(Ordering::SeqCst), serial),
                format!("rotated-refresh-{serial}"),
            )),
        };
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if panics {
                panic!("gateway bug during refresh");
            }
            result
        }
    }

    fn logout(&self, _access_token: &str) -> impl Future<Output = Result<(), GatewayError>> + Send {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}

// =========================================================================
// Harness
// =========================================================================

type Manager = SessionManager<Arc<MockGateway>, Arc<MemoryTokenStore>, Arc<MemoryEventLog>>;

struct Harness {
    manager: Manager,
    gateway: Arc<MockGateway>,
    store: Arc<MemoryTokenStore>,
    events: Arc<MemoryEventLog>,
    clock: ManualClock,
}

/// Monitor effectively off and idle timeout disabled unless a test opts in.
fn quiet_config() -> SessionConfig {
    SessionConfig {
        monitor_interval_secs: 24 * HOUR,
        idle_timeout_secs: 0,
        ..SessionConfig::default()
    }
}

fn harness(config: SessionConfig) -> Harness {
    harness_with_store(config, Arc::new(MemoryTokenStore::new()))
}

fn harness_with_store(config: SessionConfig, store: Arc<MemoryTokenStore>) -> Harness {
    let gateway = Arc::new(MockGateway::new());
    let events = Arc::new(MemoryEventLog::new());
    let clock = ManualClock::at_unix(START);
    let manager = SessionManager::builder(Arc::clone(&gateway), Arc::clone(&store), Arc::clone(&events))
        .config(config)
        .clock(clock.clone())
        .build();
    Harness {
        manager,
        gateway,
        store,
        events,
        clock,
    }
}

fn creds() -> Credentials {
    Credentials::new("Lifter@Gym.io", "hunter22")
}

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn persisted_lockout(store: &MemoryTokenStore) -> Option<LockoutState> {
    store
        .secure(LOCKOUT_KEY)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

// =========================================================================
// Login and lockout
// =========================================================================

#[tokio::test]
async fn test_login_success_persists_session() {
    let h = harness(quiet_config());

    let session = h.manager.login(&creds()).await.unwrap();

    assert_eq!(session.user_id(), "user-1");
    assert_eq!(session.user.email, "lifter@gym.io");
    assert_eq!(session.expires_at, Some(at(START + HOUR)));
    assert!(h.manager.is_authenticated());
    assert_eq!(h.store.tokens(), Some(session.tokens()));
    assert_eq!(h.store.metadata().unwrap().user_id, "user-1");
    assert_eq!(h.store.secure(DEVICE_ID_KEY), Some(session.device_id.clone()));
    assert_eq!(h.events.count(SecurityEventKind::LoginSuccess), 1);
}

#[tokio::test]
async fn test_login_failures_below_limit_count_attempts() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 2);

    for _ in 0..2 {
        let err = h.manager.login(&creds()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
    }

    assert_eq!(h.manager.lockout_state().failed_attempts, 2);
    assert!(!h.manager.is_locked_out());
    assert_eq!(persisted_lockout(&h.store).unwrap().failed_attempts, 2);
    assert_eq!(h.events.count(SecurityEventKind::LoginFailure), 2);
    assert_eq!(h.events.count(SecurityEventKind::AccountLocked), 0);
}

#[tokio::test]
async fn test_login_failure_at_limit_locks_out() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 3);

    h.manager.login(&creds()).await.unwrap_err();
    h.manager.login(&creds()).await.unwrap_err();
    let err = h.manager.login(&creds()).await.unwrap_err();

    assert!(matches!(err, AuthError::LockedOut { remaining_secs: 300 }));
    assert!(h.manager.is_locked_out());
    assert_eq!(h.manager.remaining_lockout(), Some(Duration::from_secs(300)));
    let locked = h.events.last(SecurityEventKind::AccountLocked).unwrap();
    assert_eq!(locked.severity, Severity::High);
    assert!(!locked.success);
    assert_eq!(
        persisted_lockout(&h.store).unwrap().lockout_until,
        Some(at(START + 300))
    );
}

#[tokio::test]
async fn test_login_lockout_with_huge_duration_is_capped() {
    let h = harness(SessionConfig {
        lockout_duration_secs: u64::MAX,
        ..quiet_config()
    });
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 3);

    h.manager.login(&creds()).await.unwrap_err();
    h.manager.login(&creds()).await.unwrap_err();
    let err = h.manager.login(&creds()).await.unwrap_err();

    let cap = SessionConfig::MAX_LOCKOUT_DURATION_SECS;
    assert!(matches!(err, AuthError::LockedOut { remaining_secs } if remaining_secs == cap));
    assert!(h.manager.is_locked_out());
    assert_eq!(h.manager.config().lockout_duration_secs, cap);
}

#[tokio::test]
async fn test_login_while_locked_skips_backend() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 3);
    for _ in 0..3 {
        h.manager.login(&creds()).await.unwrap_err();
    }
    h.clock.advance(Duration::from_secs(100));

    let err = h.manager.login(&creds()).await.unwrap_err();

    assert!(matches!(err, AuthError::LockedOut { remaining_secs: 200 }));
    assert_eq!(h.gateway.login_calls(), 3);
    assert_eq!(h.events.count(SecurityEventKind::LoginBlocked), 1);
}

#[tokio::test]
async fn test_login_after_lockout_window_succeeds_and_resets() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 3);
    for _ in 0..3 {
        h.manager.login(&creds()).await.unwrap_err();
    }
    h.clock.advance(Duration::from_secs(301));

    let session = h.manager.login(&creds()).await;

    assert!(session.is_ok());
    assert_eq!(h.manager.lockout_state(), LockoutState::default());
    assert!(!h.manager.is_locked_out());
    assert_eq!(h.events.count(SecurityEventKind::LockoutExpired), 1);
    assert_eq!(
        persisted_lockout(&h.store).unwrap_or_default(),
        LockoutState::default()
    );
}

#[tokio::test]
async fn test_login_success_resets_partial_failure_count() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Rejected("bad password".into()), 2);
    h.manager.login(&creds()).await.unwrap_err();
    h.manager.login(&creds()).await.unwrap_err();

    h.manager.login(&creds()).await.unwrap();

    assert_eq!(h.manager.lockout_state().failed_attempts, 0);
}

#[tokio::test]
async fn test_login_network_error_counts_as_failure() {
    let h = harness(quiet_config());
    h.gateway.fail_next_logins(GatewayError::Network("timeout".into()), 1);

    let err = h.manager.login(&creds()).await.unwrap_err();

    assert!(matches!(err, AuthError::Network(_)));
    assert_eq!(h.manager.lockout_state().failed_attempts, 1);
}

#[tokio::test]
async fn test_login_malformed_credentials_never_reach_backend() {
    let h = harness(quiet_config());

    let err = h
        .manager
        .login(&Credentials::new("not-an-email", "pw"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Validation(_)));
    assert_eq!(h.gateway.login_calls(), 0);
    assert_eq!(h.manager.lockout_state().failed_attempts, 0);
    assert_eq!(
        h.events.last(SecurityEventKind::LoginFailure).unwrap().severity,
        Severity::Low
    );
}

#[tokio::test]
async fn test_device_id_is_stable_across_logins() {
    let h = harness(quiet_config());

    let first = h.manager.login(&creds()).await.unwrap();
    h.manager.logout().await.unwrap();
    let second = h.manager.login(&creds()).await.unwrap();

    assert_eq!(first.device_id, second.device_id);
    assert_eq!(first.device_id.len(), 32);
}

// =========================================================================
// Registration
// =========================================================================

fn registration() -> Registration {
    Registration {
        email: "new@gym.io".into(),
        password: "correct horse".into(),
        password_confirmation: "correct horse".into(),
        display_name: "Ada".into(),
    }
}

#[tokio::test]
async fn test_register_establishes_session() {
    let h = harness(quiet_config());

    let session = h.manager.register(&registration()).await.unwrap();

    assert_eq!(session.user.email, "new@gym.io");
    assert!(h.manager.is_authenticated());
    assert!(h.store.tokens().is_some());
    assert_eq!(h.events.count(SecurityEventKind::RegisterSuccess), 1);
}

#[tokio::test]
async fn test_register_rejection_leaves_lockout_untouched() {
    let h = harness(quiet_config());
    *h.gateway.register_failure.lock().unwrap() =
        Some(GatewayError::Rejected("email taken".into()));

    let err = h.manager.register(&registration()).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert_eq!(h.manager.lockout_state().failed_attempts, 0);
    assert!(!h.manager.is_authenticated());
    assert_eq!(h.events.count(SecurityEventKind::RegisterFailure), 1);
}

#[tokio::test]
async fn test_register_invalid_request_is_local() {
    let h = harness(quiet_config());
    let reg = Registration {
        password_confirmation: "different".into(),
        ..registration()
    };

    let err = h.manager.register(&reg).await.unwrap_err();

    assert!(matches!(err, AuthError::Validation(_)));
    assert_eq!(h.gateway.register_calls.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Access tokens and refresh
// =========================================================================

#[tokio::test]
async fn test_valid_token_far_from_expiry_is_returned_without_refresh() {
    let h = harness(quiet_config());
    let session = h.manager.login(&creds()).await.unwrap();

    let token = h.manager.get_valid_access_token().await;

    assert_eq!(token, Some(session.access_token));
    assert_eq!(h.gateway.refresh_calls(), 0);
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_rotated() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    // 60s before expiry, inside the 300s buffer.
    h.clock.set(at(START + HOUR - 60));

    let token = h.manager.get_valid_access_token().await.unwrap();

    assert_eq!(h.gateway.refresh_calls(), 1);
    assert_eq!(
        h.gateway.last_refresh_token.lock().unwrap().as_deref(),
        Some("login-refresh-1")
    );
    assert_eq!(token, access_token(START + 2 * HOUR, 1));
    let stored = h.store.tokens().unwrap();
    assert_eq!(stored.access_token, token);
    assert_eq!(stored.refresh_token, "rotated-refresh-1");
    assert_eq!(
        h.manager.session().unwrap().expires_at,
        Some(at(START + 2 * HOUR))
    );
    assert_eq!(h.events.count(SecurityEventKind::TokenRefreshSuccess), 1);
}

/// Knows a few opaque tokens by name; anything else is decoded as a JWT.
struct TableInspector;

impl TokenInspector for TableInspector {
    fn decode(&self, token: &str) -> Result<TokenClaims, DecodeError> {
        match token {
            "T2" => Ok(TokenClaims::expiring_at(at(START + HOUR))),
            _ => JwtInspector.decode(token),
        }
    }
}

#[tokio::test]
async fn test_token_inside_buffer_rotates_to_t2_r2() {
    let gateway = Arc::new(MockGateway::new());
    gateway.access_exp.store(START + 200, Ordering::SeqCst);
    *gateway.refresh_override.lock().unwrap() = Some(TokenPair::new("T2", "R2"));
    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::builder(
        Arc::clone(&gateway),
        Arc::clone(&store),
        MemoryEventLog::new(),
    )
    .config(quiet_config())
    .inspector(TableInspector)
    .clock(ManualClock::at_unix(START))
    .build();
    manager.login(&creds()).await.unwrap();

    assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("T2"));
    assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("T2"));

    assert_eq!(gateway.refresh_calls(), 1);
    assert_eq!(store.tokens(), Some(TokenPair::new("T2", "R2")));
}

#[tokio::test]
async fn test_no_session_means_no_token() {
    let h = harness(quiet_config());

    assert_eq!(h.manager.get_valid_access_token().await, None);
    assert!(!h.manager.has_valid_session().await);
    assert_eq!(h.gateway.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_refresh() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR - 10));
    h.gateway.delay_refresh(Duration::from_millis(250));

    let callers = (0..5).map(|_| {
        let manager = h.manager.clone();
        async move { manager.get_valid_access_token().await }
    });
    let tokens = futures_util::future::join_all(callers).await;

    assert_eq!(h.gateway.refresh_calls(), 1);
    let expected = access_token(START + 2 * HOUR, 1);
    assert!(tokens.iter().all(|t| t.as_deref() == Some(expected.as_str())));
    assert!(!h.manager.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refresh_on_multi_task_callers() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR));
    h.gateway.delay_refresh(Duration::from_millis(100));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.refresh().await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(h.gateway.refresh_calls(), 1);
    assert!(results.iter().all(|t| t == &results[0] && t.is_some()));
}

#[tokio::test]
async fn test_refresh_failure_clears_session() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR - 60));
    h.gateway.fail_refresh(GatewayError::Rejected("revoked".into()));

    let token = h.manager.get_valid_access_token().await;

    assert_eq!(token, None);
    assert!(!h.manager.has_valid_session().await);
    assert!(h.manager.session().is_none());
    assert!(h.store.clear_count() >= 1);
    assert!(h.store.tokens().is_none());
    assert!(h.store.metadata().is_none());
    let failure = h.events.last(SecurityEventKind::TokenRefreshFailure).unwrap();
    assert_eq!(failure.severity, Severity::High);
    // The backend already rejected the session; it isn't told again.
    assert_eq!(h.gateway.logout_calls(), 0);
}

#[tokio::test]
async fn test_refresh_network_failure_is_terminal() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.gateway.fail_refresh(GatewayError::Network("offline".into()));

    assert_eq!(h.manager.refresh().await, None);
    assert!(!h.manager.is_authenticated());
    // A later call doesn't retry; there's nothing left to refresh with.
    assert_eq!(h.manager.refresh().await, None);
    assert_eq!(h.gateway.refresh_calls(), 1);
}

#[tokio::test]
async fn test_panicking_refresh_ends_session_and_frees_slot() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR - 200));
    h.gateway.panic_next_refresh();

    assert_eq!(h.manager.get_valid_access_token().await, None);

    assert!(!h.manager.is_refreshing());
    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
    assert_eq!(h.events.count(SecurityEventKind::TokenRefreshFailure), 1);
    assert_eq!(h.gateway.logout_calls(), 0);

    // The next session refreshes through the backend again.
    h.manager.login(&creds()).await.unwrap();
    assert!(h.manager.refresh().await.is_some());
    assert_eq!(h.gateway.refresh_calls(), 2);
    assert!(h.manager.session().is_some());
    h.manager.dispose().await;
}

#[tokio::test]
async fn test_undecodable_access_token_is_treated_as_expiring() {
    let store = Arc::new(MemoryTokenStore::new());
    let donor = harness_with_store(quiet_config(), Arc::clone(&store));
    donor.manager.login(&creds()).await.unwrap();
    donor.manager.dispose().await;
    store
        .set_tokens(&TokenPair::new("opaque", "login-refresh-1"))
        .await
        .unwrap();

    let h = harness_with_store(quiet_config(), store);
    let status = h.manager.initialize().await.unwrap();

    assert!(!status.has_valid_session);
    assert!(!h.manager.is_authenticated());
    assert_eq!(h.manager.session().unwrap().expires_at, None);
    assert!(h.manager.get_valid_access_token().await.is_some());
    assert_eq!(h.gateway.refresh_calls(), 1);
    h.manager.dispose().await;
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test]
async fn test_logout_clears_everything_but_lockout_and_device() {
    let h = harness(quiet_config());
    let session = h.manager.login(&creds()).await.unwrap();

    h.manager.logout().await.unwrap();

    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
    assert!(h.store.metadata().is_none());
    assert_eq!(h.store.secure(DEVICE_ID_KEY), Some(session.device_id));
    assert_eq!(h.gateway.logout_calls(), 1);
    assert_eq!(h.events.count(SecurityEventKind::Logout), 1);
}

#[tokio::test]
async fn test_logout_twice_is_idempotent() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();

    h.manager.logout().await.unwrap();
    h.manager.logout().await.unwrap();

    assert_eq!(h.store.clear_count(), 2);
    assert_eq!(h.gateway.logout_calls(), 1);
    assert_eq!(h.events.count(SecurityEventKind::Logout), 1);
}

#[tokio::test]
async fn test_logout_without_session_succeeds() {
    let h = harness(quiet_config());

    assert!(h.manager.logout().await.is_ok());
    assert_eq!(h.events.count(SecurityEventKind::Logout), 0);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_refresh_waits_and_wins() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR - 10));
    h.gateway.delay_refresh(Duration::from_secs(1));

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.get_valid_access_token().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.manager.is_refreshing());

    h.manager.logout().await.unwrap();
    let _ = pending.await.unwrap();

    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
    assert!(!h.manager.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_failing_refresh_counts_once() {
    let h = harness(quiet_config());
    h.manager.login(&creds()).await.unwrap();
    h.clock.set(at(START + HOUR - 10));
    h.gateway.fail_refresh(GatewayError::Rejected("revoked".into()));
    h.gateway.delay_refresh(Duration::from_secs(1));

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.get_valid_access_token().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.manager.is_refreshing());

    assert!(h.manager.logout().await.is_ok());
    assert_eq!(pending.await.unwrap(), None);

    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
    assert!(h.store.metadata().is_none());
    // One clear from the failed refresh, one from the explicit logout.
    assert_eq!(h.store.clear_count(), 2);
    assert_eq!(h.events.count(SecurityEventKind::TokenRefreshFailure), 1);
    assert_eq!(h.events.count(SecurityEventKind::Logout), 1);
    let ended = h.events.last(SecurityEventKind::Logout).unwrap();
    assert_eq!(ended.data["reason"], "refresh_failed");
    assert_eq!(h.gateway.logout_calls(), 0);
}

// =========================================================================
// Activity and idle timeout
// =========================================================================

fn idle_config(idle_timeout_secs: u64) -> SessionConfig {
    SessionConfig {
        idle_timeout_secs,
        ..quiet_config()
    }
}

#[tokio::test]
async fn test_idle_session_times_out() {
    let h = harness(idle_config(1_800));
    h.manager.login(&creds()).await.unwrap();
    h.clock.advance(Duration::from_secs(1_801));

    assert!(h.manager.check_session_timeout().await);

    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
    assert_eq!(h.events.count(SecurityEventKind::SessionTimeout), 1);
    assert_eq!(h.gateway.logout_calls(), 1);
}

#[tokio::test]
async fn test_activity_defers_idle_timeout() {
    let h = harness(idle_config(1_800));
    h.manager.login(&creds()).await.unwrap();

    h.clock.advance(Duration::from_secs(1_000));
    h.manager.update_last_activity().await.unwrap();
    h.clock.advance(Duration::from_secs(1_000));

    assert!(!h.manager.check_session_timeout().await);
    assert!(h.manager.session().is_some());
    assert_eq!(
        h.store.metadata().unwrap().last_activity,
        at(START + 1_000)
    );
}

#[tokio::test]
async fn test_idle_timeout_zero_disables_check() {
    let h = harness(idle_config(0));
    h.manager.login(&creds()).await.unwrap();
    h.clock.advance(Duration::from_secs(7 * 24 * HOUR));

    assert!(!h.manager.check_session_timeout().await);
    assert!(h.manager.session().is_some());
}

#[tokio::test]
async fn test_update_last_activity_without_session_is_noop() {
    let h = harness(quiet_config());
    assert!(h.manager.update_last_activity().await.is_ok());
    assert!(h.store.metadata().is_none());
}

// =========================================================================
// Startup
// =========================================================================

#[tokio::test]
async fn test_initialize_restores_persisted_session() {
    let store = Arc::new(MemoryTokenStore::new());
    let first = harness_with_store(quiet_config(), Arc::clone(&store));
    let session = first.manager.login(&creds()).await.unwrap();
    first.manager.dispose().await;

    let second = harness_with_store(quiet_config(), Arc::clone(&store));
    let status = second.manager.initialize().await.unwrap();

    assert!(status.has_valid_session);
    assert!(!status.is_locked);
    assert_eq!(second.manager.current_user(), Some(session.user.clone()));
    assert_eq!(second.manager.session().unwrap().device_id, session.device_id);
    assert_eq!(second.events.count(SecurityEventKind::SessionRestored), 1);
    assert_eq!(second.gateway.login_calls(), 0);
    assert!(second.manager.is_monitoring());
    second.manager.dispose().await;
    assert!(!second.manager.is_monitoring());
}

#[tokio::test]
async fn test_initialize_empty_store() {
    let h = harness(quiet_config());

    let status = h.manager.initialize().await.unwrap();

    assert!(!status.has_valid_session);
    assert_eq!(status.failed_attempts, 0);
    assert!(!h.manager.is_monitoring());
}

#[tokio::test]
async fn test_initialize_resets_lockout_that_elapsed_while_closed() {
    let store = Arc::new(MemoryTokenStore::new());
    let stale = LockoutState {
        failed_attempts: 3,
        lockout_until: Some(at(START - 10)),
    };
    store
        .set_secure(LOCKOUT_KEY, &serde_json::to_string(&stale).unwrap())
        .await
        .unwrap();
    let h = harness_with_store(quiet_config(), store);

    let status = h.manager.initialize().await.unwrap();

    assert!(!status.is_locked);
    assert_eq!(status.failed_attempts, 0);
    assert_eq!(h.events.count(SecurityEventKind::LockoutExpired), 1);
    assert_eq!(persisted_lockout(&h.store), Some(LockoutState::default()));
}

#[tokio::test]
async fn test_initialize_keeps_active_lockout() {
    let store = Arc::new(MemoryTokenStore::new());
    let active = LockoutState {
        failed_attempts: 3,
        lockout_until: Some(at(START + 120)),
    };
    store
        .set_secure(LOCKOUT_KEY, &serde_json::to_string(&active).unwrap())
        .await
        .unwrap();
    let h = harness_with_store(quiet_config(), store);

    let status = h.manager.initialize().await.unwrap();
    let err = h.manager.login(&creds()).await.unwrap_err();

    assert!(status.is_locked);
    assert_eq!(status.failed_attempts, 3);
    assert!(matches!(err, AuthError::LockedOut { remaining_secs: 120 }));
    assert_eq!(h.gateway.login_calls(), 0);
}

#[tokio::test]
async fn test_initialize_clamps_lockout_from_skewed_clock() {
    let store = Arc::new(MemoryTokenStore::new());
    let skewed = LockoutState {
        failed_attempts: 3,
        lockout_until: Some(at(START + 24 * HOUR)),
    };
    store
        .set_secure(LOCKOUT_KEY, &serde_json::to_string(&skewed).unwrap())
        .await
        .unwrap();
    let h = harness_with_store(quiet_config(), store);

    h.manager.initialize().await.unwrap();

    assert_eq!(h.manager.remaining_lockout(), Some(Duration::from_secs(300)));
    assert_eq!(
        persisted_lockout(&h.store).unwrap().lockout_until,
        Some(at(START + 300))
    );
}

#[tokio::test]
async fn test_initialize_ignores_corrupt_lockout_record() {
    let store = Arc::new(MemoryTokenStore::new());
    store.set_secure(LOCKOUT_KEY, "{not json").await.unwrap();
    let h = harness_with_store(quiet_config(), store);

    let status = h.manager.initialize().await.unwrap();

    assert_eq!(status.failed_attempts, 0);
    assert!(!status.is_locked);
}

#[tokio::test]
async fn test_initialize_discards_half_persisted_session() {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .set_tokens(&TokenPair::new(access_token(START + HOUR, 1), "r"))
        .await
        .unwrap();
    let h = harness_with_store(quiet_config(), store);

    let status = h.manager.initialize().await.unwrap();

    assert!(!status.has_valid_session);
    assert!(h.manager.session().is_none());
    assert!(h.store.tokens().is_none());
}

// =========================================================================
// Background monitor
// =========================================================================

fn monitored_config() -> SessionConfig {
    SessionConfig {
        monitor_interval_secs: 60,
        idle_timeout_secs: 0,
        ..SessionConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_monitor_refreshes_before_expiry() {
    let h = harness(monitored_config());
    h.manager.login(&creds()).await.unwrap();
    assert!(h.manager.is_monitoring());

    h.clock.set(at(START + HOUR - 120));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(h.gateway.refresh_calls(), 1);
    assert_eq!(
        h.manager.session().unwrap().expires_at,
        Some(at(START + 2 * HOUR))
    );
    h.manager.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_monitor_leaves_fresh_token_alone() {
    let h = harness(monitored_config());
    h.manager.login(&creds()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(181)).await;

    assert_eq!(h.gateway.refresh_calls(), 0);
    assert!(h.manager.is_monitoring());
    h.manager.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_monitor_ends_idle_session() {
    let h = harness(SessionConfig {
        idle_timeout_secs: 120,
        ..monitored_config()
    });
    h.manager.login(&creds()).await.unwrap();

    h.clock.advance(Duration::from_secs(200));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(h.manager.session().is_none());
    assert_eq!(h.events.count(SecurityEventKind::SessionTimeout), 1);
    assert!(!h.manager.is_monitoring());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_on_logout() {
    let h = harness(monitored_config());
    h.manager.login(&creds()).await.unwrap();

    h.manager.logout().await.unwrap();
    h.clock.set(at(START + HOUR));
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(!h.manager.is_monitoring());
    assert_eq!(h.gateway.refresh_calls(), 0);
}
