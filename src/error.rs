use thiserror::Error;

/// Failures from a rating provider. All of them are recovered locally by
/// falling back to the default rating.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classification unavailable: {0}")]
    Unavailable(String),

    #[error("classification timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed classifier output: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write failed for entity {id}: {reason}")]
    WriteFailure { id: String, reason: String },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("store query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(e: neo4rs::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
