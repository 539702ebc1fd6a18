//! Face-identity clustering over a batch of face embeddings.
//!
//! Turns a photo -> faces -> embedding index into person clusters, each with
//! a mean-embedding centroid, keeping at most one face per photo in a cluster.
//! No prior identity labels are needed.
//!
//! # Usage
//!
//! ```
//! use photoid_cluster::{CommunityDetector, Config, EmbeddingIndex, FaceData};
//!
//! let mut index = EmbeddingIndex::new();
//! index.insert_face("photo-1", "face_1", FaceData::new(vec![1.0, 0.0, 0.1]));
//! index.insert_face("photo-2", "face_1", FaceData::new(vec![0.98, 0.05, 0.1]));
//! index.insert_face("photo-3", "face_1", FaceData::new(vec![0.0, 1.0, 0.0]));
//!
//! let mut detector = CommunityDetector::new(Config::default()).unwrap();
//! let result = detector.fit(&index).unwrap();
//! assert_eq!(result.clusters.len(), 1);
//! assert_eq!(result.clusters[0].len(), 2);
//! ```
//!
//! # Design
//!
//! Clustering is a single-shot batch pass: it holds the full `n x n`
//! similarity matrix for the duration of one call, so callers bound the
//! number of faces per run. The detector borrows the index immutably, so the
//! index cannot change while it is being clustered.

mod detector;
mod error;
mod index;
mod similarity;

pub use detector::{Clustering, CommunityDetector, Config, FitStats, MERGE_THRESHOLD};
pub use error::ClusterError;
pub use index::{EmbeddingIndex, FaceData, FaceKey, PhotoFaces, PhotoId};
pub use similarity::cosine_sim;
