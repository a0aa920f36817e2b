//! File-backed [`TokenStore`]: one JSON document on disk.
//!
//! Every write is a read-modify-write of the whole document, serialized by
//! an async mutex and committed with write-to-temp + rename so a crash
//! mid-write never leaves a truncated file behind.
//!
//! The document is NOT encrypted. It's meant for desktop builds, demos and
//! integration tests; mobile hosts should implement [`TokenStore`] over the
//! platform keychain instead.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{SessionMetadata, StoreError, TokenPair, TokenStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    tokens: Option<TokenPair>,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
    #[serde(default)]
    secure: BTreeMap<String, String>,
}

/// A [`TokenStore`] persisted as a JSON file.
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Creates a store backed by `path`. The file is created on first write;
    /// a missing file reads as an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Document::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::trace!(path = %self.path.display(), "token store written");
        Ok(())
    }

    async fn update(
        &self,
        apply: impl FnOnce(&mut Document) + Send,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        apply(&mut doc);
        self.save(&doc).await
    }
}

impl TokenStore for FileTokenStore {
    fn get_tokens(
        &self,
    ) -> impl Future<Output = Result<Option<TokenPair>, StoreError>> + Send {
        async move { Ok(self.load().await?.tokens) }
    }

    fn set_tokens(
        &self,
        tokens: &TokenPair,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let tokens = tokens.clone();
        async move { self.update(|doc| doc.tokens = Some(tokens)).await }
    }

    fn get_session_metadata(
        &self,
    ) -> impl Future<Output = Result<Option<SessionMetadata>, StoreError>> + Send {
        async move { Ok(self.load().await?.metadata) }
    }

    fn set_session_metadata(
        &self,
        metadata: &SessionMetadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let metadata = metadata.clone();
        async move { self.update(|doc| doc.metadata = Some(metadata)).await }
    }

    fn get_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        let key = key.to_string();
        async move { Ok(self.load().await?.secure.remove(&key)) }
    }

    fn set_secure(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let (key, value) = (key.to_string(), value.to_string());
        async move {
            self.update(|doc| {
                doc.secure.insert(key, value);
            })
            .await
        }
    }

    fn remove_secure(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let key = key.to_string();
        async move {
            self.update(|doc| {
                doc.secure.remove(&key);
            })
            .await
        }
    }

    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            self.update(|doc| {
                doc.tokens = None;
                doc.metadata = None;
            })
            .await
        }
    }
}
