use thiserror::Error;

/// Errors that can arise while interacting with the village storage layer.
#[derive(Debug, Error)]
pub enum VillageError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-agnostic store failure (also used by the in-memory store's failure injection).
    #[error("store failure: {0}")]
    Store(String),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A one-time operation was already performed (participation, pet adoption, ...).
    #[error("already done: {0}")]
    AlreadyDone(String),

    /// The game instance has no stores yet.
    #[error("instance not initialized: {0}")]
    Uninitialized(String),

    /// Optimistic concurrency check failed (stale revision or retries exhausted).
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Rejected input (bad amount, unknown pet, malformed identifier).
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl VillageError {
    /// True for failures that originate in the backing store rather than in game rules.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            VillageError::Sled(_)
                | VillageError::Bincode(_)
                | VillageError::Io(_)
                | VillageError::Store(_)
        )
    }
}
