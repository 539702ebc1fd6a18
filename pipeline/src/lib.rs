//! Face clustering pipeline.
//!
//! [`extract::build_index`] turns photos into an [`EmbeddingIndex`] using a
//! caller-supplied [`FaceEmbedder`]. [`ClusterRunner`] clusters a complete
//! index once and persists the result: one person per cluster, one face per
//! member, and every photo linked to its persons and marked as processed.
//!
//! [`EmbeddingIndex`]: photoid_cluster::EmbeddingIndex

mod error;
pub mod extract;
mod runner;

pub use error::{PipelineError, Result};
pub use extract::{EmbedError, ExtractOutcome, FaceEmbedder, PhotoSource, build_index};
pub use runner::{ClusterRunner, FailedPhoto, RunReport, RunnerConfig};
