//! The identity backend contract.
//!
//! liftguard doesn't speak OAuth or issue JWTs itself; that's the identity
//! provider's job. The [`AuthGateway`] trait is the narrow slice of that
//! provider the session manager needs: log in, register, refresh, log out.
//! Hosts implement it over their HTTP client; tests implement it with a
//! scripted mock.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use liftguard_store::TokenPair;
use serde::{Deserialize, Serialize};

use crate::{AuthError, GatewayError};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Login credentials as typed by the user.
#[derive(Clone)]
pub struct Credentials {
    /// Email address.
    pub identifier: String,
    /// Password.
    pub secret: String,
}

impl Credentials {
    /// Creates credentials from anything string-like.
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// The identifier as sent to the backend: trimmed and lowercased.
    pub fn normalized_identifier(&self) -> String {
        self.identifier.trim().to_lowercase()
    }

    /// Checks the shape of the credentials without any network call.
    ///
    /// # Errors
    /// [`AuthError::Validation`] if the identifier isn't an email address
    /// or the secret is empty.
    pub fn validate(&self) -> Result<(), AuthError> {
        validate_email(&self.identifier)?;
        if self.secret.is_empty() {
            return Err(AuthError::Validation("Password is required.".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A sign-up request.
#[derive(Clone)]
pub struct Registration {
    /// Email address; becomes the login identifier.
    pub email: String,
    /// Chosen password.
    pub password: String,
    /// Must equal `password`.
    pub password_confirmation: String,
    /// Name shown in the app.
    pub display_name: String,
}

impl Registration {
    /// Checks the shape of the request without any network call.
    ///
    /// # Errors
    /// [`AuthError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), AuthError> {
        validate_email(&self.email)?;
        if self.display_name.trim().is_empty() {
            return Err(AuthError::Validation("Name is required.".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters."
            )));
        }
        if self.password != self.password_confirmation {
            return Err(AuthError::Validation("Passwords do not match.".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// The authenticated user, as described by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend user id.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A successful login or registration.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    /// Who logged in.
    pub user: UserProfile,
    /// Their new tokens.
    pub tokens: TokenPair,
}

// ---------------------------------------------------------------------------
// AuthGateway
// ---------------------------------------------------------------------------

/// The identity backend primitives the session manager consumes.
///
/// Methods return `impl Future + Send` so they can run inside spawned
/// Tokio tasks (the single-flight refresh runs in one).
///
/// Error mapping: return [`GatewayError::Network`] for anything transient
/// and [`GatewayError::Rejected`] when the backend answered with a refusal.
pub trait AuthGateway: Send + Sync + 'static {
    /// Exchanges credentials for a user and token pair.
    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send;

    /// Creates an account and returns its first token pair.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send;

    /// Exchanges a refresh token for a new pair.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, GatewayError>> + Send;

    /// Revokes the session on the backend.
    fn logout(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Lets a caller keep an `Arc` to the gateway while the manager owns one.
impl<T: AuthGateway> AuthGateway for Arc<T> {
    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        (**self).login(identifier, secret)
    }

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send {
        (**self).register(registration)
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, GatewayError>> + Send {
        (**self).refresh(refresh_token)
    }

    fn logout(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).logout(access_token)
    }
}

fn validate_email(raw: &str) -> Result<(), AuthError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".into()));
    }
    let invalid = || AuthError::Validation("Enter a valid email address.".into());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, _)) if !host.is_empty() && !domain.ends_with('.') => Ok(()),
        _ => Err(invalid()),
    }
}
