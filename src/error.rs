//! Error types.
//!
//! Nothing here is fatal to the host process: store failures either degrade to
//! a cold-start state or surface as a typed error the caller can report.

use thiserror::Error;

/// Persistence backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bandit document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation '{op}' timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// User id cannot be used as a document key.
    #[error("invalid document key '{0}'")]
    InvalidKey(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by [`CmabManager`](crate::CmabManager).
#[derive(Debug, Error)]
pub enum CmabError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The user's persisted state could not be read, so feedback was not applied.
    #[error("bandit state for user '{user_id}' is unavailable: {source}")]
    StateUnavailable {
        user_id: String,
        #[source]
        source: StoreError,
    },

    #[error("user id must be non-empty")]
    InvalidUserId,
}

pub type Result<T> = std::result::Result<T, CmabError>;
