//! The [`TokenInspector`] trait and the JWT implementation.
//!
//! The session manager doesn't care what format the backend's tokens use.
//! It only needs something that implements [`TokenInspector`] and can
//! tell it when a token expires. [`JwtInspector`] covers the common case
//! of JSON Web Tokens; backends with opaque tokens can plug in their own.

use std::time::{Duration, SystemTime};

use crate::{DecodeError, TokenClaims};

/// Reads claims out of a raw token string.
///
/// Implementations must be cheap and side-effect free: the session manager
/// calls `decode` on every access-token request.
///
/// # Example
///
/// ```rust
/// use std::time::{Duration, SystemTime};
/// use liftguard_token::{DecodeError, TokenClaims, TokenInspector};
///
/// /// Tokens of the form "opaque.<unix-expiry>".
/// struct SuffixInspector;
///
/// impl TokenInspector for SuffixInspector {
///     fn decode(&self, token: &str) -> Result<TokenClaims, DecodeError> {
///         let (_, exp) = token
///             .rsplit_once('.')
///             .ok_or_else(|| DecodeError::Malformed("no expiry suffix".into()))?;
///         let secs: u64 = exp.parse().map_err(|_| DecodeError::MissingExpiry)?;
///         Ok(TokenClaims::expiring_at(
///             SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
///         ))
///     }
/// }
///
/// let claims = SuffixInspector.decode("abc.60").unwrap();
/// assert_eq!(claims.expires_at, SystemTime::UNIX_EPOCH + Duration::from_secs(60));
/// ```
pub trait TokenInspector: Send + Sync + 'static {
    /// Decodes the claims of `token` without verifying it.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] if the token can't be parsed or carries
    /// no expiry. Callers treat that as "already expired".
    fn decode(&self, token: &str) -> Result<TokenClaims, DecodeError>;
}

// ---------------------------------------------------------------------------
// JwtInspector
// ---------------------------------------------------------------------------

#[cfg(feature = "jwt")]
mod jwt {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde::Deserialize;

    use super::*;

    /// A [`TokenInspector`] for JSON Web Tokens.
    ///
    /// Decodes the payload segment (`header.payload.signature`) and reads
    /// `exp`, `iat` and `sub`. The signature is NOT checked; the backend
    /// remains the only authority on whether a token is valid.
    ///
    /// Both base64url and standard base64 payloads are accepted, with or
    /// without padding.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct JwtInspector;

    /// The subset of registered claims we read. Numeric dates may arrive
    /// as integers or floats.
    #[derive(Deserialize)]
    struct RawClaims {
        exp: Option<f64>,
        iat: Option<f64>,
        sub: Option<String>,
    }

    impl TokenInspector for JwtInspector {
        fn decode(&self, token: &str) -> Result<TokenClaims, DecodeError> {
            let mut segments = token.split('.');
            let payload = match (
                segments.next(),
                segments.next(),
                segments.next(),
                segments.next(),
            ) {
                (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => {
                    payload
                }
                _ => {
                    return Err(DecodeError::Malformed(
                        "expected three dot-separated segments".into(),
                    ));
                }
            };

            // Normalize to the unpadded url-safe alphabet.
            let normalized: String = payload
                .trim_end_matches('=')
                .chars()
                .map(|c| match c {
                    '+' => '-',
                    '/' => '_',
                    other => other,
                })
                .collect();

            let bytes = URL_SAFE_NO_PAD
                .decode(normalized.as_bytes())
                .map_err(DecodeError::Base64)?;
            let raw: RawClaims =
                serde_json::from_slice(&bytes).map_err(DecodeError::Json)?;

            let expires_at = raw
                .exp
                .and_then(numeric_date)
                .ok_or(DecodeError::MissingExpiry)?;

            Ok(TokenClaims {
                expires_at,
                issued_at: raw.iat.and_then(numeric_date),
                subject: raw.sub,
            })
        }
    }

    /// Converts a JWT NumericDate (seconds since the epoch) to a
    /// `SystemTime`. Negative, NaN or out-of-range values yield `None`.
    fn numeric_date(secs: f64) -> Option<SystemTime> {
        let offset = Duration::try_from_secs_f64(secs).ok()?;
        SystemTime::UNIX_EPOCH.checked_add(offset)
    }

    /// Builds an unsigned JWT (`alg: none`) carrying `claims`.
    ///
    /// Useful for fixtures, demos and tests that need a token with a known
    /// expiry. Never hand one of these to a real backend.
    pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.")
    }
}

#[cfg(feature = "jwt")]
pub use jwt::{JwtInspector, unsigned_jwt};

#[cfg(all(test, feature = "jwt"))]
mod tests {
    use serde_json::json;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_decode_reads_exp_iat_and_sub() {
        let token = unsigned_jwt(&json!({
            "exp": 1_700_000_300u64,
            "iat": 1_700_000_000u64,
            "sub": "user-42",
        }));

        let claims = JwtInspector.decode(&token).expect("should decode");

        assert_eq!(claims.expires_at, at(1_700_000_300));
        assert_eq!(claims.issued_at, Some(at(1_700_000_000)));
        assert_eq!(claims.subject.as_deref(), Some("user-42"));
    }

    #[test]
    fn test_decode_missing_exp_returns_missing_expiry() {
        let token = unsigned_jwt(&json!({ "sub": "user-42" }));

        let result = JwtInspector.decode(&token);

        assert!(matches!(result, Err(DecodeError::MissingExpiry)));
    }

    #[test]
    fn test_decode_negative_exp_returns_missing_expiry() {
        let token = unsigned_jwt(&json!({ "exp": -5 }));

        assert!(matches!(
            JwtInspector.decode(&token),
            Err(DecodeError::MissingExpiry)
        ));
    }

    #[test]
    fn test_decode_two_segments_returns_malformed() {
        let result = JwtInspector.decode("header.payload");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_opaque_token_returns_malformed() {
        let result = JwtInspector.decode("not-a-jwt");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_garbage_payload_returns_base64_error() {
        let result = JwtInspector.decode("aaa.!!!.bbb");
        assert!(matches!(result, Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_non_json_payload_returns_json_error() {
        let payload = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            b"hello",
        );
        let result = JwtInspector.decode(&format!("h.{payload}.s"));
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let token = unsigned_jwt(&json!({ "exp": 1 }));
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        parts[1].push_str("==");

        let claims = JwtInspector
            .decode(&parts.join("."))
            .expect("padding should be tolerated");

        assert_eq!(claims.expires_at, at(1));
    }

    #[test]
    fn test_decode_fractional_exp() {
        let token = unsigned_jwt(&json!({ "exp": 120.5 }));

        let claims = JwtInspector.decode(&token).unwrap();

        assert_eq!(
            claims.expires_at,
            SystemTime::UNIX_EPOCH + Duration::from_millis(120_500)
        );
    }
}
