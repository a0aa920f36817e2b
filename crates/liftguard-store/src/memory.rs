//! In-memory [`TokenStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{SessionMetadata, StoreError, TokenPair, TokenStore};

#[derive(Default)]
struct Entries {
    tokens: Option<TokenPair>,
    metadata: Option<SessionMetadata>,
    secure: HashMap<String, String>,
}

/// A [`TokenStore`] that keeps everything in process memory.
///
/// Nothing survives a restart, which makes it the natural store for tests.
/// It also counts `clear` and `set_tokens` calls so tests can assert that
/// the session manager actually wiped or rotated persisted state.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<Entries>,
    clears: AtomicUsize,
    token_writes: AtomicUsize,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times [`TokenStore::clear`] has been called.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// How many times [`TokenStore::set_tokens`] has been called.
    pub fn token_write_count(&self) -> usize {
        self.token_writes.load(Ordering::SeqCst)
    }

    /// Current tokens, read synchronously.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.lock().tokens.clone()
    }

    /// Current metadata, read synchronously.
    pub fn metadata(&self) -> Option<SessionMetadata> {
        self.lock().metadata.clone()
    }

    /// Current value of a secure entry, read synchronously.
    pub fn secure(&self, key: &str) -> Option<String> {
        self.lock().secure.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // A poisoned lock only means another thread panicked mid-update of
        // plain data; the map itself is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_tokens(
        &self,
    ) -> impl Future<Output = Result<Option<TokenPair>, StoreError>> + Send {
        let tokens = self.lock().tokens.clone();
        async move { Ok(tokens) }
    }

    fn set_tokens(
        &self,
        tokens: &TokenPair,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.lock().tokens = Some(tokens.clone());
        self.token_writes.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }

    fn get_session_metadata(
        &self,
    ) -> impl Future<Output = Result<Option<SessionMetadata>, StoreError>> + Send {
        let metadata = self.lock().metadata.clone();
        async move { Ok(metadata) }
    }

    fn set_session_metadata(
        &self,
        metadata: &SessionMetadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.lock().metadata = Some(metadata.clone());
        async { Ok(()) }
    }

    fn get_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        let value = self.lock().secure.get(key).cloned();
        async move { Ok(value) }
    }

    fn set_secure(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.lock()
            .secure
            .insert(key.to_string(), value.to_string());
        async { Ok(()) }
    }

    fn remove_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.lock().secure.remove(key);
        async { Ok(()) }
    }

    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        {
            let mut entries = self.lock();
            entries.tokens = None;
            entries.metadata = None;
        }
        self.clears.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}
