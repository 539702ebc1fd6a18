use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ClusterError;

/// Identifier of a source photo.
pub type PhotoId = String;

/// Identifier of a face within its photo (e.g. "face_1").
pub type FaceKey = String;

/// A detected face with its identity embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    /// Identity embedding produced by the face embedder.
    pub embedding: Vec<f32>,

    /// Detection confidence.
    #[serde(default)]
    pub score: f32,

    /// Facial area as `[x, y, width, height]` in source pixels.
    #[serde(default)]
    pub bbox: [i32; 4],
}

impl FaceData {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            score: 1.0,
            bbox: [0; 4],
        }
    }
}

/// Faces detected in one photo, in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoFaces {
    #[serde(default)]
    pub faces: IndexMap<FaceKey, FaceData>,
}

impl PhotoFaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a face, replacing any face with the same key in place.
    pub fn with_face(mut self, key: impl Into<FaceKey>, face: FaceData) -> Self {
        self.faces.insert(key.into(), face);
        self
    }
}

/// Ordered mapping of photo to its detected faces.
///
/// Iteration order is insertion order and survives (de)serialization;
/// clustering tie-breaks depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingIndex {
    photos: IndexMap<PhotoId, PhotoFaces>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a photo. A replaced photo keeps its position.
    pub fn insert_photo(&mut self, id: impl Into<PhotoId>, faces: PhotoFaces) -> Option<PhotoFaces> {
        self.photos.insert(id.into(), faces)
    }

    /// Appends a face to a photo, creating the photo entry if needed.
    pub fn insert_face(&mut self, photo_id: impl Into<PhotoId>, key: impl Into<FaceKey>, face: FaceData) {
        self.photos
            .entry(photo_id.into())
            .or_default()
            .faces
            .insert(key.into(), face);
    }

    pub fn photo(&self, id: &str) -> Option<&PhotoFaces> {
        self.photos.get(id)
    }

    pub fn face(&self, photo_id: &str, key: &str) -> Option<&FaceData> {
        self.photos.get(photo_id).and_then(|p| p.faces.get(key))
    }

    /// Number of photos.
    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// Total number of faces across all photos.
    pub fn face_count(&self) -> usize {
        self.photos.values().map(|p| p.faces.len()).sum()
    }

    pub fn photo_ids(&self) -> impl Iterator<Item = &str> {
        self.photos.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, PhotoId, PhotoFaces> {
        self.photos.iter()
    }
}

impl FromIterator<(PhotoId, PhotoFaces)> for EmbeddingIndex {
    fn from_iter<I: IntoIterator<Item = (PhotoId, PhotoFaces)>>(iter: I) -> Self {
        Self {
            photos: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EmbeddingIndex {
    type Item = (&'a PhotoId, &'a PhotoFaces);
    type IntoIter = indexmap::map::Iter<'a, PhotoId, PhotoFaces>;

    fn into_iter(self) -> Self::IntoIter {
        self.photos.iter()
    }
}

/// Run-scoped arena of every face in an [`EmbeddingIndex`].
///
/// The three arrays always have the same length; position `i` identifies
/// one face for the lifetime of a clustering run.
pub(crate) struct FlatIndex<'a> {
    pub photo_id_of: Vec<&'a str>,
    pub face_key_of: Vec<&'a str>,
    pub embedding_of: Vec<&'a [f32]>,
    pub dim: usize,
}

impl<'a> FlatIndex<'a> {
    /// Flattens photos then faces in insertion order, validating every
    /// embedding against the first one's dimension.
    pub fn build(index: &'a EmbeddingIndex) -> Result<Self, ClusterError> {
        let n = index.face_count();
        let mut flat = FlatIndex {
            photo_id_of: Vec::with_capacity(n),
            face_key_of: Vec::with_capacity(n),
            embedding_of: Vec::with_capacity(n),
            dim: 0,
        };

        for (photo_id, photo) in index {
            for (face_key, face) in &photo.faces {
                let emb = face.embedding.as_slice();
                let err_ctx = || (photo_id.clone(), face_key.clone());

                if emb.is_empty() {
                    let (photo_id, face_key) = err_ctx();
                    return Err(ClusterError::EmptyEmbedding { photo_id, face_key });
                }
                if flat.dim == 0 {
                    flat.dim = emb.len();
                } else if emb.len() != flat.dim {
                    let (photo_id, face_key) = err_ctx();
                    return Err(ClusterError::DimensionMismatch {
                        photo_id,
                        face_key,
                        expected: flat.dim,
                        got: emb.len(),
                    });
                }
                if let Some(reason) = invalid_reason(emb) {
                    let (photo_id, face_key) = err_ctx();
                    return Err(ClusterError::InvalidEmbedding {
                        photo_id,
                        face_key,
                        reason,
                    });
                }

                flat.photo_id_of.push(photo_id);
                flat.face_key_of.push(face_key);
                flat.embedding_of.push(emb);
            }
        }

        Ok(flat)
    }

    pub fn len(&self) -> usize {
        self.embedding_of.len()
    }

    /// Component-wise mean of the embeddings at `members`.
    pub fn mean(&self, members: &[usize]) -> Vec<f32> {
        let mut sum = vec![0.0f64; self.dim];
        for &i in members {
            for (acc, &x) in sum.iter_mut().zip(self.embedding_of[i]) {
                *acc += x as f64;
            }
        }
        let n = members.len().max(1) as f64;
        sum.into_iter().map(|x| (x / n) as f32).collect()
    }
}

fn invalid_reason(emb: &[f32]) -> Option<&'static str> {
    if emb.iter().any(|x| !x.is_finite()) {
        return Some("non-finite component");
    }
    if emb.iter().all(|&x| x == 0.0) {
        return Some("zero norm");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(v: &[f32]) -> FaceData {
        FaceData::new(v.to_vec())
    }

    #[test]
    fn flatten_follows_insertion_order() {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p2", "b", face(&[0.0, 1.0]));
        index.insert_face("p1", "z", face(&[1.0, 0.0]));
        index.insert_face("p2", "a", face(&[1.0, 1.0]));

        let flat = FlatIndex::build(&index).unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat.photo_id_of, vec!["p2", "p2", "p1"]);
        assert_eq!(flat.face_key_of, vec!["b", "a", "z"]);
        assert_eq!(flat.dim, 2);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "f1", face(&[1.0, 0.0, 0.0]));
        index.insert_face("p2", "f1", face(&[1.0, 0.0]));

        let err = FlatIndex::build(&index).err().unwrap();
        match err {
            ClusterError::DimensionMismatch {
                photo_id,
                expected,
                got,
                ..
            } => {
                assert_eq!(photo_id, "p2");
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_and_degenerate_embeddings_are_rejected() {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "f1", face(&[]));
        assert!(matches!(
            FlatIndex::build(&index),
            Err(ClusterError::EmptyEmbedding { .. })
        ));

        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "f1", face(&[0.0, 0.0]));
        assert!(matches!(
            FlatIndex::build(&index),
            Err(ClusterError::InvalidEmbedding { reason: "zero norm", .. })
        ));

        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "f1", face(&[f32::NAN, 1.0]));
        assert!(matches!(
            FlatIndex::build(&index),
            Err(ClusterError::InvalidEmbedding { .. })
        ));
    }

    #[test]
    fn photos_without_faces_flatten_to_nothing() {
        let mut index = EmbeddingIndex::new();
        index.insert_photo("p1", PhotoFaces::new());
        let flat = FlatIndex::build(&index).unwrap();
        assert_eq!(flat.len(), 0);
        assert_eq!(index.len(), 1);
        assert_eq!(index.face_count(), 0);
    }

    #[test]
    fn mean_is_component_wise() {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "f1", face(&[1.0, 0.0]));
        index.insert_face("p2", "f1", face(&[0.0, 1.0]));
        index.insert_face("p3", "f1", face(&[1.0, 1.0]));
        let flat = FlatIndex::build(&index).unwrap();

        let m = flat.mean(&[0, 1, 2]);
        assert!((m[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((m[1] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn index_deserializes_in_document_order() {
        let json = r#"{
            "zeta": {"faces": {"f2": {"embedding": [1.0, 0.0], "score": 0.9, "bbox": [1, 2, 3, 4]},
                               "f1": {"embedding": [0.0, 1.0]}}},
            "alpha": {"faces": {}}
        }"#;
        let index: EmbeddingIndex = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = index.photo_ids().collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);

        let keys: Vec<&String> = index.photo("zeta").unwrap().faces.keys().collect();
        assert_eq!(keys, vec!["f2", "f1"]);
        assert_eq!(index.face("zeta", "f2").unwrap().bbox, [1, 2, 3, 4]);
        assert_eq!(index.face("zeta", "f1").unwrap().score, 0.0);
    }
}
