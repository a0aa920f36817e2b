//! Error types for token inspection.
//!
//! Decoding is advisory only: nothing here validates a signature. A
//! decode error just means the client cannot tell when the token expires,
//! and callers treat such tokens as already expired.

/// Errors that can occur while decoding a token's claims.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The token doesn't have the expected shape
    /// (e.g. a JWT without three dot-separated segments).
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The payload segment isn't valid base64url.
    #[cfg(feature = "jwt")]
    #[error("payload is not valid base64: {0}")]
    Base64(base64::DecodeError),

    /// The payload decoded to bytes that aren't a JSON claims object.
    #[cfg(feature = "jwt")]
    #[error("payload is not a JSON claims object: {0}")]
    Json(serde_json::Error),

    /// The claims carry no usable `exp` value.
    #[error("token has no usable expiry claim")]
    MissingExpiry,
}
