//! Clustering run that persists its result.

use std::collections::HashMap;
use std::sync::Arc;

use photoid_cluster::{CommunityDetector, Config, EmbeddingIndex, FitStats};
use photoid_store::{Datastore, Face, Person, Photo, Repository, StoreResult, codec};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};

/// Configuration for a [`ClusterRunner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Owner recorded on every created person.
    pub owner: String,

    pub cluster: Config,

    /// Extra attempts for a photo update that failed with a transient
    /// store error.
    pub max_retries: usize,

    /// Cluster photos already marked as processed again.
    #[serde(default)]
    pub reprocess: bool,
}

impl RunnerConfig {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            cluster: Config {
                threshold: 0.7,
                min_community_size: 2,
                init_max_size: 5,
            },
            max_retries: 2,
            reprocess: false,
        }
    }
}

/// A photo whose link update did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPhoto {
    pub photo_id: String,
    pub reason: String,
}

/// Outcome of [`ClusterRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Persons created, one per cluster.
    pub persons: usize,
    /// Faces created.
    pub faces: usize,
    /// Photos marked as processed.
    pub photos_updated: usize,
    /// Photos left out because an earlier run processed them.
    pub photos_skipped: usize,
    /// Photos of the owner still unprocessed after the run.
    pub photos_pending: usize,
    pub failed_photos: Vec<FailedPhoto>,
    pub stats: FitStats,
}

/// Clusters an embedding index and writes the result to a datastore.
///
/// Photos already marked as processed are left out unless
/// [`RunnerConfig::reprocess`] is set. Each cluster becomes a [`Person`] with
/// one [`Face`] per member. Every remaining photo of the index is then linked
/// to its persons and faces and marked as processed. A photo that cannot be
/// updated is reported and skipped; rows already written stay in place.
pub struct ClusterRunner {
    repo: Repository,
    detector: CommunityDetector,
    cfg: RunnerConfig,
}

impl ClusterRunner {
    pub fn new(store: Arc<dyn Datastore>, cfg: RunnerConfig) -> Result<Self> {
        let detector = CommunityDetector::new(cfg.cluster)?;
        Ok(Self {
            repo: Repository::new(store),
            detector,
            cfg,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    /// Runs one clustering pass over `index` and persists it.
    ///
    /// Fails without writing anything if the index is invalid. Fails after
    /// clustering if persons or faces cannot be inserted.
    pub fn run(&self, index: &EmbeddingIndex) -> Result<RunReport> {
        let (pending, skipped) = self.pending(index)?;
        if skipped > 0 {
            info!("skipping {} processed photos", skipped);
        }
        let index = &pending;

        info!(
            "clustering {} faces from {} photos",
            index.face_count(),
            index.len()
        );
        let clustering = self.detector.detect(index)?;
        info!("found {} persons", clustering.len());

        let mut persons = Vec::with_capacity(clustering.len());
        let mut faces = Vec::new();
        let mut people_of: HashMap<&str, Vec<String>> = HashMap::new();
        let mut faces_of: HashMap<&str, Vec<String>> = HashMap::new();

        for (members, centroid) in clustering.iter() {
            let mut person = Person::new(self.cfg.owner.as_str(), centroid.to_vec());
            for (photo_id, face_key) in members {
                let data = index
                    .face(photo_id, face_key)
                    .ok_or_else(|| PipelineError::MissingFace {
                        photo_id: photo_id.clone(),
                        face_key: face_key.clone(),
                    })?;
                let face = Face {
                    id: codec::new_id(),
                    known: false,
                    embedding: data.embedding.clone(),
                    score: data.score,
                    person_id: Some(person.id.clone()),
                    photo_id: photo_id.clone(),
                    bbox: Some(data.bbox),
                };

                person.faces.push(face.id.clone());
                if !person.images.contains(photo_id) {
                    person.images.push(photo_id.clone());
                }
                let people = people_of.entry(photo_id.as_str()).or_default();
                if !people.contains(&person.id) {
                    people.push(person.id.clone());
                }
                faces_of
                    .entry(photo_id.as_str())
                    .or_default()
                    .push(face.id.clone());
                faces.push(face);
            }
            persons.push(person);
        }

        self.repo.insert_all(&persons)?;
        self.repo.insert_all(&faces)?;
        debug!("stored {} persons and {} faces", persons.len(), faces.len());

        let mut report = RunReport {
            persons: persons.len(),
            faces: faces.len(),
            photos_skipped: skipped,
            stats: clustering.stats,
            ..RunReport::default()
        };

        for photo_id in index.photo_ids() {
            let people = people_of.get(photo_id).map_or(&[][..], Vec::as_slice);
            let face_ids = faces_of.get(photo_id).map_or(&[][..], Vec::as_slice);

            let reason = match self.link_with_retry(photo_id, people, face_ids) {
                Ok(true) => {
                    report.photos_updated += 1;
                    continue;
                }
                Ok(false) => "photo not found".to_string(),
                Err(e) => e.to_string(),
            };
            error!("failed to update photo {}: {}", photo_id, reason);
            report.failed_photos.push(FailedPhoto {
                photo_id: photo_id.to_string(),
                reason,
            });
        }

        report.photos_pending = self.repo.unprocessed_count(&self.cfg.owner)?;
        info!(
            "updated {} photos, {} failed, {} pending",
            report.photos_updated,
            report.failed_photos.len(),
            report.photos_pending
        );
        Ok(report)
    }

    /// Drops photos whose stored record is already processed.
    ///
    /// Photos missing from the store stay in, so linking reports them.
    fn pending(&self, index: &EmbeddingIndex) -> Result<(EmbeddingIndex, usize)> {
        if self.cfg.reprocess {
            return Ok((index.clone(), 0));
        }
        let mut pending = EmbeddingIndex::new();
        let mut skipped = 0;
        for (photo_id, faces) in index {
            match self.repo.get::<Photo>(photo_id)? {
                Some(photo) if photo.faces_processed => {
                    debug!("photo {} already processed", photo_id);
                    skipped += 1;
                }
                _ => {
                    pending.insert_photo(photo_id.clone(), faces.clone());
                }
            }
        }
        Ok((pending, skipped))
    }

    fn link_with_retry(&self, photo_id: &str, people: &[String], faces: &[String]) -> StoreResult<bool> {
        let mut attempt = 0;
        loop {
            match self.repo.link_photo(photo_id, people, faces) {
                Err(e) if e.is_transient() && attempt < self.cfg.max_retries => {
                    attempt += 1;
                    warn!("retrying photo {} (attempt {}): {}", photo_id, attempt, e);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoid_cluster::FaceData;
    use photoid_store::{Entity, MemoryDatastore, Page, Photo, Query, Record, StoreError};
    use std::sync::Mutex;

    /// Delegates to a memory store, failing photo updates for one id.
    struct FailingStore {
        inner: MemoryDatastore,
        photo_id: String,
        /// Failures left before updates succeed. `None` fails forever.
        remaining: Mutex<Option<usize>>,
        error: fn() -> StoreError,
        attempts: Mutex<usize>,
    }

    impl FailingStore {
        fn new(photo_id: &str, remaining: Option<usize>, error: fn() -> StoreError) -> Self {
            Self {
                inner: MemoryDatastore::new(),
                photo_id: photo_id.into(),
                remaining: Mutex::new(remaining),
                error,
                attempts: Mutex::new(0),
            }
        }
    }

    impl Datastore for FailingStore {
        fn insert(&self, entity: Entity, record: Record) -> StoreResult<()> {
            self.inner.insert(entity, record)
        }

        fn insert_many(&self, entity: Entity, records: Vec<Record>) -> StoreResult<()> {
            self.inner.insert_many(entity, records)
        }

        fn find(&self, entity: Entity, query: &Query, page: Page) -> StoreResult<Vec<Record>> {
            self.inner.find(entity, query, page)
        }

        fn find_by_id(&self, entity: Entity, id: &str) -> StoreResult<Option<Record>> {
            self.inner.find_by_id(entity, id)
        }

        fn count(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
            self.inner.count(entity, query)
        }

        fn update(&self, entity: Entity, id: &str, patch: Record) -> StoreResult<bool> {
            if entity == Entity::Photo && id == self.photo_id {
                *self.attempts.lock().unwrap() += 1;
                let mut remaining = self.remaining.lock().unwrap();
                match remaining.as_mut() {
                    None => return Err((self.error)()),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err((self.error)());
                    }
                }
            }
            self.inner.update(entity, id, patch)
        }

        fn delete(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
            self.inner.delete(entity, query)
        }
    }

    fn index() -> EmbeddingIndex {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "face_1", FaceData::new(vec![1.0, 0.0, 0.0]));
        index.insert_face("p2", "face_1", FaceData::new(vec![0.99, 0.1, 0.0]));
        index.insert_face("p3", "face_1", FaceData::new(vec![0.0, 0.0, 1.0]));
        index
    }

    fn seed_photos(repo: &Repository, ids: &[&str]) {
        for id in ids {
            repo.insert(&Photo::new(*id, format!("{id}.jpg"), "u1")).unwrap();
        }
    }

    fn storage_error() -> StoreError {
        StoreError::Storage("io".into())
    }

    fn invalid_error() -> StoreError {
        StoreError::InvalidRecord("bad".into())
    }

    #[test]
    fn run_persists_persons_faces_and_links() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let runner = ClusterRunner::new(store, RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&index()).unwrap();
        assert_eq!(report.persons, 1);
        assert_eq!(report.faces, 2);
        assert_eq!(report.photos_updated, 3);
        assert!(report.failed_photos.is_empty());
        assert_eq!(report.stats.clusters, 1);

        let persons = repo.persons("u1").unwrap();
        assert_eq!(persons.len(), 1);
        let person = &persons[0];
        assert_eq!(person.images, vec!["p1", "p2"]);
        assert_eq!(person.faces.len(), 2);
        assert!(person.name.is_none());

        let faces = repo.faces_of_person(&person.id).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].photo_id, "p1");
        assert_eq!(faces[0].embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(faces[0].score, 1.0);
        assert!(!faces[0].known);

        let p1: Photo = repo.get("p1").unwrap().unwrap();
        assert!(p1.faces_processed);
        assert_eq!(p1.people, vec![person.id.clone()]);
        assert_eq!(p1.faces, vec![faces[0].id.clone()]);

        let p3: Photo = repo.get("p3").unwrap().unwrap();
        assert!(p3.faces_processed);
        assert!(p3.people.is_empty());
        assert!(repo.unprocessed_photos("u1").unwrap().is_empty());
        assert_eq!(report.photos_pending, 0);
    }

    #[test]
    fn rerun_skips_processed_photos() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let runner = ClusterRunner::new(store.clone(), RunnerConfig::new("u1")).unwrap();
        runner.run(&index()).unwrap();
        let person_id = repo.persons("u1").unwrap()[0].id.clone();

        let report = runner.run(&index()).unwrap();
        assert_eq!(report.photos_skipped, 3);
        assert_eq!(report.persons, 0);
        assert_eq!(report.photos_updated, 0);
        assert_eq!(repo.persons("u1").unwrap().len(), 1);
        let p1: Photo = repo.get("p1").unwrap().unwrap();
        assert_eq!(p1.people, vec![person_id.clone()]);

        // A new photo is clustered on its own; processed ones stay linked.
        seed_photos(&repo, &["p4"]);
        let mut index = index();
        index.insert_face("p4", "face_1", FaceData::new(vec![1.0, 0.05, 0.0]));
        let report = runner.run(&index).unwrap();
        assert_eq!(report.photos_skipped, 3);
        assert_eq!(report.photos_updated, 1);
        assert_eq!(report.persons, 0);
        assert!(repo.get::<Photo>("p4").unwrap().unwrap().faces_processed);
        assert_eq!(repo.get::<Photo>("p1").unwrap().unwrap().people, vec![person_id]);
    }

    #[test]
    fn reprocess_clusters_processed_photos_again() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let mut cfg = RunnerConfig::new("u1");
        cfg.reprocess = true;
        let runner = ClusterRunner::new(store, cfg).unwrap();
        runner.run(&index()).unwrap();
        let report = runner.run(&index()).unwrap();
        assert_eq!(report.photos_skipped, 0);
        assert_eq!(report.persons, 1);
        assert_eq!(repo.persons("u1").unwrap().len(), 2);
    }

    #[test]
    fn missing_photo_is_reported_and_skipped() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p2", "p3"]);

        let runner = ClusterRunner::new(store, RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&index()).unwrap();
        assert_eq!(report.photos_updated, 2);
        assert_eq!(report.failed_photos.len(), 1);
        assert_eq!(report.failed_photos[0].photo_id, "p1");
        assert_eq!(repo.persons("u1").unwrap().len(), 1);
        assert!(repo.get::<Photo>("p2").unwrap().unwrap().faces_processed);
    }

    #[test]
    fn transient_failures_are_retried() {
        let store = Arc::new(FailingStore::new("p2", Some(2), storage_error));
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let runner = ClusterRunner::new(store.clone(), RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&index()).unwrap();
        assert!(report.failed_photos.is_empty());
        assert_eq!(report.photos_updated, 3);
        assert_eq!(*store.attempts.lock().unwrap(), 3);
    }

    #[test]
    fn exhausted_retries_do_not_stop_the_batch() {
        let store = Arc::new(FailingStore::new("p1", None, storage_error));
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let runner = ClusterRunner::new(store.clone(), RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&index()).unwrap();
        assert_eq!(report.failed_photos.len(), 1);
        assert_eq!(report.failed_photos[0].photo_id, "p1");
        assert_eq!(report.photos_updated, 2);
        assert_eq!(*store.attempts.lock().unwrap(), 3);

        assert_eq!(repo.persons("u1").unwrap().len(), 1);
        assert!(!repo.get::<Photo>("p1").unwrap().unwrap().faces_processed);
        assert!(repo.get::<Photo>("p2").unwrap().unwrap().faces_processed);
        assert_eq!(report.photos_pending, 1);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let store = Arc::new(FailingStore::new("p3", None, invalid_error));
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2", "p3"]);

        let runner = ClusterRunner::new(store.clone(), RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&index()).unwrap();
        assert_eq!(report.failed_photos.len(), 1);
        assert_eq!(*store.attempts.lock().unwrap(), 1);
    }

    #[test]
    fn invalid_index_writes_nothing() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let repo = Repository::new(store.clone());
        seed_photos(&repo, &["p1", "p2"]);

        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "face_1", FaceData::new(vec![1.0, 0.0]));
        index.insert_face("p2", "face_1", FaceData::new(vec![1.0, 0.0, 0.0]));

        let runner = ClusterRunner::new(store, RunnerConfig::new("u1")).unwrap();
        assert!(matches!(runner.run(&index), Err(PipelineError::Cluster(_))));
        assert!(repo.persons("u1").unwrap().is_empty());
        assert_eq!(repo.unprocessed_photos("u1").unwrap().len(), 2);
    }

    #[test]
    fn empty_index_creates_nothing() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let runner = ClusterRunner::new(store, RunnerConfig::new("u1")).unwrap();
        let report = runner.run(&EmbeddingIndex::new()).unwrap();
        assert_eq!(report, RunReport::default());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let mut cfg = RunnerConfig::new("u1");
        cfg.cluster.threshold = 1.5;
        assert!(matches!(
            ClusterRunner::new(store, cfg),
            Err(PipelineError::Cluster(_))
        ));
    }
}
