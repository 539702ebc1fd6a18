use thiserror::Error;

/// Errors that can occur in datastore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store: {entity} {id} already exists")]
    Conflict { entity: &'static str, id: String },

    #[error("store: invalid record: {0}")]
    InvalidRecord(String),

    #[error("store: serialization error: {0}")]
    Serialization(String),

    #[error("store: storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    /// Only backend storage failures qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Storage(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;
