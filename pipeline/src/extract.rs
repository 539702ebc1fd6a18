//! Builds an embedding index by running a face embedder over photos.

use std::panic;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use photoid_cluster::{EmbeddingIndex, PhotoFaces};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of extraction workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors from a [`FaceEmbedder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbedError {
    #[error("embed: decode error: {0}")]
    Decode(String),

    #[error("embed: model error: {0}")]
    Model(String),
}

/// A photo to extract faces from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSource {
    pub id: String,
    pub uri: String,
}

impl PhotoSource {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
        }
    }
}

/// Detects faces in a photo and embeds each of them.
///
/// Implementations are constructed by the caller and shared by every
/// extraction worker.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, photo: &PhotoSource) -> Result<PhotoFaces, EmbedError>;
}

/// Result of [`build_index`].
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    /// Photos that were embedded, in source order.
    pub index: EmbeddingIndex,
    /// Photos the embedder failed on, in source order.
    pub failed: Vec<(String, EmbedError)>,
}

/// Embeds every source on `num_workers` threads and assembles the index.
///
/// This is where an external face detection model plugs in: callers wrap it
/// in a [`FaceEmbedder`] and feed the resulting index to
/// [`ClusterRunner::run`](crate::ClusterRunner::run). Nothing in this
/// workspace ships an embedder.
///
/// Workers pull photos from a shared cursor, so completion order is
/// arbitrary; the index is assembled in source order once all workers are
/// done. A failing photo is logged and collected without stopping the rest.
/// A panicking embedder propagates the panic to the caller.
pub fn build_index(sources: &[PhotoSource], embedder: &dyn FaceEmbedder, num_workers: usize) -> ExtractOutcome {
    let workers = num_workers.clamp(1, sources.len().max(1));
    info!("extracting faces from {} photos on {} workers", sources.len(), workers);

    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<Result<PhotoFaces, EmbedError>>>> =
        sources.iter().map(|_| Mutex::new(None)).collect();

    let (next, slots_ref) = (&next, &slots);
    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(source) = sources.get(i) else {
                            break;
                        };
                        let result = embedder.embed(source);
                        if let Ok(mut slot) = slots_ref[i].lock() {
                            *slot = Some(result);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
    });

    let mut outcome = ExtractOutcome::default();
    for (source, slot) in sources.iter().zip(slots) {
        let result = slot.into_inner().ok().flatten();
        match result {
            Some(Ok(faces)) => {
                debug!("photo {}: {} faces", source.id, faces.faces.len());
                outcome.index.insert_photo(source.id.clone(), faces);
            }
            Some(Err(e)) => {
                warn!("photo {}: {}", source.id, e);
                outcome.failed.push((source.id.clone(), e));
            }
            None => {
                let e = EmbedError::Model("no result".into());
                warn!("photo {}: {}", source.id, e);
                outcome.failed.push((source.id.clone(), e));
            }
        }
    }

    info!(
        "extracted {} faces from {} photos, {} failed",
        outcome.index.face_count(),
        outcome.index.len(),
        outcome.failed.len()
    );
    outcome
}
