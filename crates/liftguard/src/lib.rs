//! # liftguard
//!
//! Client-side authentication lifecycle for a mobile workout tracker: login
//! with brute-force lockout, persisted sessions, proactive single-flight
//! token refresh, idle timeout and a security audit trail.
//!
//! The host application provides three things: an [`AuthGateway`] over its
//! identity backend, a [`TokenStore`] over secure storage and a
//! [`SecurityEventLog`] sink. liftguard does the rest.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use liftguard::prelude::*;
//!
//! // let config = LiftguardConfig::from_path("liftguard.json")?;
//! // liftguard::telemetry::init(&config.log_filter)?;
//! // let manager = SessionManager::new(my_gateway, FileTokenStore::new(path),
//! //     TracingEventLog, config.session);
//! // manager.initialize().await?;
//! // let token = manager.get_valid_access_token().await;
//! ```

mod config;
mod error;
pub mod telemetry;

pub use config::LiftguardConfig;
pub use error::LiftguardError;

pub use liftguard_monitor as monitor;
pub use liftguard_session as session;
pub use liftguard_store as store;
pub use liftguard_token as token;

pub use liftguard_session::{
    AuthError, AuthGateway, Credentials, InitStatus, LoginResponse, Registration,
    SecurityEvent, SecurityEventKind, SecurityEventLog, Session, SessionConfig, SessionManager,
    Severity, UserProfile,
};
pub use liftguard_store::{TokenPair, TokenStore};

/// Everything a host typically needs in one import.
pub mod prelude {
    pub use crate::{LiftguardConfig, LiftguardError};
    pub use liftguard_session::{
        AuthError, AuthGateway, Clock, Credentials, GatewayError, InitStatus, LoginResponse,
        MemoryEventLog, Registration, SecurityEvent, SecurityEventKind, SecurityEventLog,
        Session, SessionConfig, SessionManager, Severity, SystemClock, TracingEventLog,
        UserProfile,
    };
    pub use liftguard_store::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
}
