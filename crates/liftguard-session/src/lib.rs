//! Session and authentication lifecycle for liftguard.
//!
//! This crate owns everything between "the user typed a password" and "the
//! HTTP client has a bearer token":
//!
//! 1. **Authentication**: login and registration against an identity
//!    backend ([`AuthGateway`] trait)
//! 2. **Brute-force protection**: failed-attempt counting and a timed
//!    lockout that survives restarts ([`LockoutState`])
//! 3. **Token lifecycle**: proactive, single-flight refresh and a
//!    background monitor ([`SessionManager`])
//! 4. **Audit trail**: a [`SecurityEvent`] for every security-relevant
//!    transition, sent to a [`SecurityEventLog`]
//!
//! # How it fits in the stack
//!
//! ```text
//! App / HTTP client (above)  ← asks for a valid access token
//!     ↕
//! Session Layer (this crate)  ← login, lockout, refresh, logout
//!     ↕
//! Store / Token / Monitor (below)  ← persistence, expiry decoding, ticks
//! ```

mod clock;
mod config;
mod error;
mod events;
mod gateway;
mod lockout;
mod manager;
mod refresh;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{AuthError, EventLogError, GatewayError};
pub use events::{
    ChannelEventLog, MemoryEventLog, SecurityEvent, SecurityEventKind, SecurityEventLog,
    Severity, TracingEventLog,
};
pub use gateway::{AuthGateway, Credentials, LoginResponse, MIN_PASSWORD_LEN, Registration, UserProfile};
pub use lockout::LockoutState;
pub use manager::{DEVICE_ID_KEY, InitStatus, LOCKOUT_KEY, SessionManager, SessionManagerBuilder};
pub use session::Session;

pub use liftguard_store::{SessionMetadata, StoreError, TokenPair, TokenStore};
pub use liftguard_token::{DecodeError, TokenClaims, TokenInspector};
