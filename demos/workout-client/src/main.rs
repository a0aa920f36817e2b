use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use liftguard::prelude::*;
use liftguard::token::unsigned_jwt;
use serde_json::json;

// ---------------------------------------------------------------------------
// In-process identity backend
// ---------------------------------------------------------------------------

const TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

struct Account {
    id: String,
    password: String,
    display_name: String,
}

#[derive(Default)]
struct DemoBackend {
    accounts: Mutex<HashMap<String, Account>>,
    /// refresh token -> email
    refresh_tokens: Mutex<HashMap<String, String>>,
    serial: AtomicU64,
}

impl DemoBackend {
    fn issue(&self, email: &str) -> TokenPair {
        let n = self.serial.fetch_add(1, Ordering::Relaxed);
        let exp = (SystemTime::now() + TOKEN_TTL)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let access = unsigned_jwt(&json!({ "sub": email, "exp": exp, "jti": n }));
        let refresh = format!("rt-{n}-{email}");
        self.refresh_tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(refresh.clone(), email.to_string());
        TokenPair::new(access, refresh)
    }

    fn response(&self, email: &str, account: &Account) -> LoginResponse {
        LoginResponse {
            user: UserProfile {
                id: account.id.clone(),
                email: email.to_string(),
                display_name: Some(account.display_name.clone()),
            },
            tokens: self.issue(email),
        }
    }
}

impl AuthGateway for DemoBackend {
    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let result = match accounts.get(identifier) {
            Some(account) if account.password == secret => Ok(self.response(identifier, account)),
            _ => Err(GatewayError::Rejected("invalid email or password".into())),
        };
        async move { result }
    }

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        let email = registration.email.trim().to_lowercase();
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let result = if accounts.contains_key(&email) {
            Err(GatewayError::Rejected("email already registered".into()))
        } else {
            let account = Account {
                id: format!("user-{}", accounts.len() + 1),
                password: registration.password.clone(),
                display_name: registration.display_name.clone(),
            };
            let response = self.response(&email, &account);
            accounts.insert(email, account);
            Ok(response)
        };
        async move { result }
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, GatewayError>> + Send {
        let owner = self
            .refresh_tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(refresh_token);
        let result = match owner {
            Some(email) => Ok(self.issue(&email)),
            None => Err(GatewayError::Rejected("refresh token revoked".into())),
        };
        async move { result }
    }

    fn logout(&self, _access_token: &str) -> impl Future<Output = Result<(), GatewayError>> + Send {
        async { Ok(()) }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LiftguardError> {
    let config = match std::env::args().nth(1) {
        Some(path) => LiftguardConfig::from_path(path)?,
        None => LiftguardConfig::default(),
    };
    liftguard::telemetry::init(&config.log_filter)?;

    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("workout-client-auth.json"));
    tracing::info!(store = %store_path.display(), "workout client starting");

    let manager = SessionManager::new(
        DemoBackend::default(),
        FileTokenStore::new(store_path),
        TracingEventLog,
        config.session.clone(),
    );

    let status = manager.initialize().await?;
    tracing::info!(?status, "restored state");

    if status.is_locked {
        let remaining = manager.remaining_lockout().unwrap_or_default();
        tracing::warn!(remaining_secs = remaining.as_secs(), "locked out, come back later");
        manager.dispose().await;
        return Ok(());
    }

    // The backend lives in this process, so a restored session's refresh
    // token is unknown to it. Start clean.
    manager.logout().await?;

    let email = "lifter@liftguard.dev";
    let registration = Registration {
        email: email.into(),
        password: "deadlift-405".into(),
        password_confirmation: "deadlift-405".into(),
        display_name: "Demo Lifter".into(),
    };
    let session = manager.register(&registration).await?;
    tracing::info!(user = ?session.user, "registered");
    manager.logout().await?;

    match manager.login(&Credentials::new(email, "bench-225")).await {
        Ok(_) => tracing::error!("wrong password was accepted"),
        Err(e) => tracing::info!(message = %e.user_message(), "wrong password rejected"),
    }

    manager
        .login(&Credentials::new(email, "deadlift-405"))
        .await?;
    manager.update_last_activity().await?;

    if let Some(token) = manager.get_valid_access_token().await {
        tracing::info!(token_len = token.len(), "calling the workout API with a fresh token");
    }
    match manager.refresh().await {
        Some(_) => tracing::info!("token rotated"),
        None => tracing::warn!("refresh failed, sign in again"),
    }

    manager.logout().await?;
    tracing::info!(has_session = manager.has_valid_session().await, "done");
    Ok(())
}
