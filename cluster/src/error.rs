use thiserror::Error;

/// Errors returned by clustering operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("empty embedding for face {face_key} in photo {photo_id}")]
    EmptyEmbedding { photo_id: String, face_key: String },

    #[error("dimension mismatch for face {face_key} in photo {photo_id}: expected {expected}, got {got}")]
    DimensionMismatch {
        photo_id: String,
        face_key: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid embedding for face {face_key} in photo {photo_id}: {reason}")]
    InvalidEmbedding {
        photo_id: String,
        face_key: String,
        reason: &'static str,
    },
}
