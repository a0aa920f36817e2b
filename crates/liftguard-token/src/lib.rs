//! Token inspection for liftguard.
//!
//! The session manager never needs to *trust* an access token, it only
//! needs to know when the token will stop working so it can refresh it
//! ahead of time. This crate provides that capability behind a trait:
//!
//! - **Claims** ([`TokenClaims`]): the handful of values the client cares
//!   about (expiry, issue time, subject).
//! - **Inspector** ([`TokenInspector`] trait, [`JwtInspector`]): how a raw
//!   token string is turned into claims.
//! - **Errors** ([`DecodeError`]): what can go wrong while decoding.
//!
//! ```text
//! Session layer (above)  ← asks "is this token about to expire?"
//!     ↕
//! Token layer (this crate)  ← decodes claims, no signature checks
//! ```

mod claims;
mod error;
mod inspector;

pub use claims::TokenClaims;
pub use error::DecodeError;
pub use inspector::TokenInspector;
#[cfg(feature = "jwt")]
pub use inspector::{JwtInspector, unsigned_jwt};
