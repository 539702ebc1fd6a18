use photoid_cluster::ClusterError;
use photoid_store::StoreError;
use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline: {0}")]
    Cluster(#[from] ClusterError),

    #[error("pipeline: {0}")]
    Store(#[from] StoreError),

    /// A clustered face is not present in the index it came from.
    #[error("pipeline: face {face_key} of photo {photo_id} missing from index")]
    MissingFace { photo_id: String, face_key: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
