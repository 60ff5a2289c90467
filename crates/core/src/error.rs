use thiserror::Error;

pub type CadenceResult<T> = Result<T, CadenceError>;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transient channel error: {0}")]
    TransientChannel(String),

    #[error("Permanent channel error: {0}")]
    PermanentChannel(String),

    #[error("Store conflict on key {key}: expected version {expected}, found {found}")]
    StoreConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CadenceError {
    /// Transient errors are absorbed by the executor and retried with
    /// backoff; everything else fails the attempt permanently.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CadenceError::TransientChannel(_) | CadenceError::StoreConflict { .. }
        )
    }
}
