use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store: not found: {0}")]
    NotFound(String),

    #[error("store: storage error: {0}")]
    Storage(String),

    #[error("store: serialization error: {0}")]
    Serialization(String),

    #[error("store: invalid config: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn storage<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Storage(e.to_string())
}
