use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ClusterError;
use crate::index::{EmbeddingIndex, FaceKey, FlatIndex, PhotoId};
use crate::similarity::{SimilarityMatrix, cosine_sim, top_k};

/// Centroid similarity above which two communities are merged.
/// Independent of [`Config::threshold`].
pub const MERGE_THRESHOLD: f32 = 0.7;

/// Number of nearest centroids considered as merge targets.
const MERGE_CANDIDATES: usize = 3;

/// Controls community detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum cosine similarity for two faces to be the same person.
    /// Must be in (0, 1]. Default: 0.7.
    pub threshold: f32,

    /// Minimum neighborhood size (self included) for a face to seed a
    /// community. Default: 2.
    pub min_community_size: usize,

    /// Number of nearest neighbors explored per seed before falling back
    /// to a full row scan. Default: 10.
    pub init_max_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_community_size: 2,
            init_max_size: 10,
        }
    }
}

impl Config {
    fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.threshold == 0.0 {
            self.threshold = defaults.threshold;
        }
        if self.min_community_size == 0 {
            self.min_community_size = defaults.min_community_size;
        }
        if self.init_max_size == 0 {
            self.init_max_size = defaults.init_max_size;
        }
        self
    }

    fn validate(&self) -> Result<(), ClusterError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ClusterError::InvalidConfig(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Counters describing one clustering run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitStats {
    /// Faces in the flattened index.
    pub faces: usize,
    /// Faces whose neighborhood reached `min_community_size`.
    pub seeds: usize,
    /// Accepted communities after greedy deduplication.
    pub communities: usize,
    /// Community pairs merged by centroid similarity.
    pub merged: usize,
    /// Final clusters.
    pub clusters: usize,
    /// Faces dropped because another face of the same photo was kept.
    pub dropped_duplicates: usize,
}

/// Result of a clustering run.
///
/// `clusters[k]` pairs with `centroids[k]`. Each cluster holds at most one
/// face per photo. Centroids are the mean over the cluster's members before
/// per-photo deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clustering {
    pub clusters: Vec<Vec<(PhotoId, FaceKey)>>,
    pub centroids: Vec<Vec<f32>>,
    pub stats: FitStats,
}

impl Clustering {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Iterates `(members, centroid)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[(PhotoId, FaceKey)], &[f32])> {
        self.clusters
            .iter()
            .map(Vec::as_slice)
            .zip(self.centroids.iter().map(Vec::as_slice))
    }
}

/// Groups face embeddings into person clusters.
///
/// # Algorithm
///
/// 1. Every face whose `min_community_size` nearest neighbors (self included)
///    are all at or above `threshold` seeds a candidate community made of its
///    neighbors at or above `threshold`.
/// 2. Candidates are ranked by size and accepted greedily when none of their
///    faces was claimed by an earlier accepted community.
/// 3. Communities whose centroids are more similar than [`MERGE_THRESHOLD`]
///    are merged in a single greedy pass.
/// 4. Within each cluster only the face closest to the centroid is kept per
///    photo.
///
/// The result is deterministic for a given index and configuration.
pub struct CommunityDetector {
    cfg: Config,
    last: Clustering,
}

impl CommunityDetector {
    /// Creates a detector. Zero-valued fields take their defaults.
    pub fn new(cfg: Config) -> Result<Self, ClusterError> {
        let cfg = cfg.with_defaults();
        cfg.validate()?;
        Ok(Self {
            cfg,
            last: Clustering::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Clusters the index and keeps the result for [`clusters`](Self::clusters)
    /// and [`centroids`](Self::centroids).
    pub fn fit(&mut self, index: &EmbeddingIndex) -> Result<&Clustering, ClusterError> {
        self.last = self.detect(index)?;
        Ok(&self.last)
    }

    /// Clusters the index and returns the cluster members.
    pub fn fit_predict(
        &mut self,
        index: &EmbeddingIndex,
    ) -> Result<Vec<Vec<(PhotoId, FaceKey)>>, ClusterError> {
        Ok(self.fit(index)?.clusters.clone())
    }

    /// Same as [`fit_predict`](Self::fit_predict).
    pub fn predict(
        &mut self,
        index: &EmbeddingIndex,
    ) -> Result<Vec<Vec<(PhotoId, FaceKey)>>, ClusterError> {
        self.fit_predict(index)
    }

    /// Clusters from the last [`fit`](Self::fit).
    pub fn clusters(&self) -> &[Vec<(PhotoId, FaceKey)>] {
        &self.last.clusters
    }

    /// Centroids from the last [`fit`](Self::fit).
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.last.centroids
    }

    /// Clusters the index without touching the detector's stored result.
    pub fn detect(&self, index: &EmbeddingIndex) -> Result<Clustering, ClusterError> {
        let flat = FlatIndex::build(index)?;
        let n = flat.len();
        if n == 0 {
            debug!("no faces to cluster");
            return Ok(Clustering::default());
        }

        let mut stats = FitStats {
            faces: n,
            ..FitStats::default()
        };

        let matrix = SimilarityMatrix::build(&flat.embedding_of);

        let mut candidates: Vec<Vec<usize>> = (0..n)
            .filter(|&i| self.is_seed(matrix.row(i)))
            .map(|i| self.expand(matrix.row(i)))
            .collect();
        stats.seeds = candidates.len();

        // Stable: equal sizes keep seed order.
        candidates.sort_by(|a, b| b.len().cmp(&a.len()));
        let communities = claim_disjoint(candidates, n);
        stats.communities = communities.len();
        debug!(
            faces = n,
            seeds = stats.seeds,
            communities = communities.len(),
            "communities extracted"
        );

        let centroids: Vec<Vec<f32>> = communities.iter().map(|c| flat.mean(c)).collect();
        let (merged, merges) = merge_similar(&communities, &centroids);
        stats.merged = merges;

        let centroids: Vec<Vec<f32>> = merged.iter().map(|c| flat.mean(c)).collect();

        let mut clusters = Vec::with_capacity(merged.len());
        for (members, centroid) in merged.iter().zip(&centroids) {
            let (kept, dropped) = one_face_per_photo(&flat, members, centroid);
            stats.dropped_duplicates += dropped;
            clusters.push(
                kept.into_iter()
                    .map(|i| (flat.photo_id_of[i].to_string(), flat.face_key_of[i].to_string()))
                    .collect(),
            );
        }
        stats.clusters = clusters.len();
        debug!(
            clusters = stats.clusters,
            merged = stats.merged,
            dropped = stats.dropped_duplicates,
            "clustering done"
        );

        Ok(Clustering {
            clusters,
            centroids,
            stats,
        })
    }

    /// A face seeds a community when its `min_community_size` largest
    /// similarities are all at or above the threshold.
    fn is_seed(&self, row: &[f32]) -> bool {
        let k = self.cfg.min_community_size;
        if k > row.len() {
            return false;
        }
        top_k(row, k)
            .last()
            .is_some_and(|&(_, v)| v >= self.cfg.threshold)
    }

    /// Candidate community around a seed.
    ///
    /// If the `init_max_size` nearest neighbors already fall below the
    /// threshold, members are taken from that sorted list up to the first
    /// miss. Otherwise the neighborhood may be larger than the cap and the
    /// whole row is scanned in index order.
    fn expand(&self, row: &[f32]) -> Vec<usize> {
        let threshold = self.cfg.threshold;
        let nearest = top_k(row, self.cfg.init_max_size);

        match nearest.last() {
            Some(&(_, smallest)) if smallest < threshold => nearest
                .iter()
                .take_while(|&&(_, v)| v >= threshold)
                .map(|&(j, _)| j)
                .collect(),
            _ => row
                .iter()
                .enumerate()
                .filter(|&(_, &v)| v >= threshold)
                .map(|(j, _)| j)
                .collect(),
        }
    }
}

/// Accepts ranked communities whose members are all unclaimed, claiming
/// them. The accepted communities are pairwise disjoint.
fn claim_disjoint(ranked: Vec<Vec<usize>>, n: usize) -> Vec<Vec<usize>> {
    let mut claimed = vec![false; n];
    let mut accepted = Vec::new();
    for community in ranked {
        if community.iter().any(|&i| claimed[i]) {
            continue;
        }
        for &i in &community {
            claimed[i] = true;
        }
        accepted.push(community);
    }
    accepted
}

/// Single greedy pass merging communities by centroid similarity.
///
/// Community `i` is merged with each of its three nearest centroids that
/// exceeds [`MERGE_THRESHOLD`] and has not been seen yet; both sides are then
/// seen. A community that is still unseen after its own turn is kept as is.
/// Returns the new member lists and the number of merges.
fn merge_similar(communities: &[Vec<usize>], centroids: &[Vec<f32>]) -> (Vec<Vec<usize>>, usize) {
    let m = centroids.len();
    let nearest: Vec<Vec<(usize, f32)>> = (0..m)
        .map(|i| {
            let mut sims: Vec<(usize, f32)> = (0..m)
                .filter(|&j| j != i)
                .map(|j| (j, cosine_sim(&centroids[i], &centroids[j])))
                .collect();
            sims.sort_by(|a, b| b.1.total_cmp(&a.1));
            sims.truncate(MERGE_CANDIDATES);
            sims
        })
        .collect();

    let mut seen = vec![false; m];
    let mut out = Vec::with_capacity(m);
    let mut merges = 0;
    for i in 0..m {
        for &(j, sim) in &nearest[i] {
            if sim > MERGE_THRESHOLD && !seen[j] {
                let mut members = communities[i].clone();
                members.extend_from_slice(&communities[j]);
                debug!(left = i, right = j, sim, "merging communities");
                out.push(members);
                seen[i] = true;
                seen[j] = true;
                merges += 1;
            }
        }
        if !seen[i] {
            out.push(communities[i].clone());
        }
    }
    (out, merges)
}

/// Keeps one face per photo: the first seen, replaced by a later face of the
/// same photo only if that face is strictly closer to the centroid.
/// Photos keep the order of their first appearance. Returns the kept flat
/// indices and the number of dropped faces.
fn one_face_per_photo(flat: &FlatIndex<'_>, members: &[usize], centroid: &[f32]) -> (Vec<usize>, usize) {
    let mut slot: HashMap<&str, usize> = HashMap::with_capacity(members.len());
    let mut kept: Vec<(usize, f32)> = Vec::with_capacity(members.len());
    let mut dropped = 0;

    for &i in members {
        let sim = cosine_sim(flat.embedding_of[i], centroid);
        match slot.get(flat.photo_id_of[i]) {
            Some(&pos) => {
                dropped += 1;
                if sim > kept[pos].1 {
                    kept[pos] = (i, sim);
                }
            }
            None => {
                slot.insert(flat.photo_id_of[i], kept.len());
                kept.push((i, sim));
            }
        }
    }

    (kept.into_iter().map(|(i, _)| i).collect(), dropped)
}
