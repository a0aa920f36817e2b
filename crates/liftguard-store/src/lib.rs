//! Token storage abstraction for liftguard.
//!
//! Provides the [`TokenStore`] trait the session manager persists through,
//! plus two reference implementations:
//!
//! - [`MemoryTokenStore`]: process-local, for tests and ephemeral hosts
//! - [`FileTokenStore`]: a single JSON document on disk
//!
//! On a phone the real store is the platform keychain; hosts implement
//! [`TokenStore`] over it.
//!
//! # Feature Flags
//!
//! - `file` (default): [`FileTokenStore`] via `tokio::fs`

mod error;
#[cfg(feature = "file")]
mod file;
mod memory;
mod types;

pub use error::StoreError;
#[cfg(feature = "file")]
pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;
pub use types::{SessionMetadata, TokenPair};

use std::future::Future;

/// Secure persisted key-value storage for tokens, session metadata and
/// small counters.
///
/// There are three groups of operations:
///
/// - **tokens**: the access/refresh pair of the current session
/// - **session metadata**: who is logged in, on which device, since when
/// - **generic secure entries**: anything else (lockout state, device id)
///
/// [`clear`](Self::clear) wipes the first two groups only. Generic entries
/// survive a logout so that, for example, a lockout can't be bypassed by
/// logging out.
///
/// Methods return `impl Future + Send` so the session manager can run them
/// inside spawned Tokio tasks.
pub trait TokenStore: Send + Sync + 'static {
    /// Loads the persisted token pair, if any.
    fn get_tokens(
        &self,
    ) -> impl Future<Output = Result<Option<TokenPair>, StoreError>> + Send;

    /// Replaces the persisted token pair.
    fn set_tokens(
        &self,
        tokens: &TokenPair,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads the persisted session metadata, if any.
    fn get_session_metadata(
        &self,
    ) -> impl Future<Output = Result<Option<SessionMetadata>, StoreError>> + Send;

    /// Replaces the persisted session metadata.
    fn set_session_metadata(
        &self,
        metadata: &SessionMetadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads a generic secure entry.
    fn get_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Writes a generic secure entry.
    fn set_secure(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a generic secure entry. Removing a missing key is not an error.
    fn remove_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes tokens and session metadata.
    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Lets a caller keep an `Arc` to the store while the manager owns one.
impl<T: TokenStore> TokenStore for std::sync::Arc<T> {
    fn get_tokens(
        &self,
    ) -> impl Future<Output = Result<Option<TokenPair>, StoreError>> + Send {
        (**self).get_tokens()
    }

    fn set_tokens(
        &self,
        tokens: &TokenPair,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_tokens(tokens)
    }

    fn get_session_metadata(
        &self,
    ) -> impl Future<Output = Result<Option<SessionMetadata>, StoreError>> + Send {
        (**self).get_session_metadata()
    }

    fn set_session_metadata(
        &self,
        metadata: &SessionMetadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_session_metadata(metadata)
    }

    fn get_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        (**self).get_secure(key)
    }

    fn set_secure(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_secure(key, value)
    }

    fn remove_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).remove_secure(key)
    }

    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).clear()
    }
}
