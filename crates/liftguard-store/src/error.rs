//! Error types for the storage layer.

/// Errors that can occur while reading or writing persisted auth state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying medium failed (disk, keychain, ...).
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted value couldn't be serialized or parsed back.
    #[error("stored value is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store is temporarily unusable (locked keychain, revoked
    /// permission, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
