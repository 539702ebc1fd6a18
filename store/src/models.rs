use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::datastore::Entity;

/// A typed record stored in one [`Entity`] collection.
pub trait Model: Serialize + DeserializeOwned {
    const ENTITY: Entity;

    fn id(&self) -> &str;
}

/// A source photo and the identities linked to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub uri: String,
    pub owner: String,

    /// Set once face clustering has linked this photo.
    #[serde(default)]
    pub faces_processed: bool,

    /// Persons appearing in this photo.
    #[serde(default)]
    pub people: Vec<String>,

    /// Face records detected in this photo.
    #[serde(default)]
    pub faces: Vec<String>,
}

impl Photo {
    pub fn new(id: impl Into<String>, uri: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            owner: owner.into(),
            faces_processed: false,
            people: Vec::new(),
            faces: Vec::new(),
        }
    }
}

impl Model for Photo {
    const ENTITY: Entity = Entity::Photo;

    fn id(&self) -> &str {
        &self.id
    }
}

/// An identity discovered by clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub owner: String,

    /// Mean embedding of the faces clustered into this person.
    #[serde(with = "codec::vector")]
    pub centroid: Vec<f32>,

    #[serde(default)]
    pub faces: Vec<String>,

    /// Photos this person appears in.
    #[serde(default)]
    pub images: Vec<String>,
}

impl Person {
    pub fn new(owner: impl Into<String>, centroid: Vec<f32>) -> Self {
        Self {
            id: codec::new_id(),
            name: None,
            owner: owner.into(),
            centroid,
            faces: Vec::new(),
            images: Vec::new(),
        }
    }
}

impl Model for Person {
    const ENTITY: Entity = Entity::Person;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One detected face, optionally linked to a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: String,

    /// True once a user confirmed the identity.
    #[serde(default)]
    pub known: bool,

    #[serde(with = "codec::vector")]
    pub embedding: Vec<f32>,

    #[serde(with = "codec::scalar")]
    pub score: f32,

    #[serde(default)]
    pub person_id: Option<String>,

    pub photo_id: String,

    /// `[x, y, width, height]`.
    #[serde(default)]
    pub bbox: Option<[i32; 4]>,
}

impl Model for Face {
    const ENTITY: Entity = Entity::Face;

    fn id(&self) -> &str {
        &self.id
    }
}
