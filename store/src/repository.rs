//! Typed access to a [`Datastore`].

use std::sync::Arc;

use serde_json::{Value, json};

use crate::codec::{from_record, to_record};
use crate::datastore::{Datastore, Entity, Join, Page, Query, Record};
use crate::models::{Face, Model, Person, Photo};
use crate::StoreResult;

/// Maps [`Model`] types to and from records in a shared datastore.
#[derive(Debug, Clone)]
pub struct Repository {
    store: Arc<dyn Datastore>,
}

impl Repository {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Returns the underlying datastore.
    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn insert<M: Model>(&self, model: &M) -> StoreResult<()> {
        self.store.insert(M::ENTITY, to_record(model)?)
    }

    /// Inserts all models in one atomic batch.
    pub fn insert_all<M: Model>(&self, models: &[M]) -> StoreResult<()> {
        if models.is_empty() {
            return Ok(());
        }
        let records = models.iter().map(to_record).collect::<StoreResult<Vec<_>>>()?;
        self.store.insert_many(M::ENTITY, records)
    }

    pub fn get<M: Model>(&self, id: &str) -> StoreResult<Option<M>> {
        self.store
            .find_by_id(M::ENTITY, id)?
            .map(from_record)
            .transpose()
    }

    pub fn find<M: Model>(&self, query: &Query, page: Page) -> StoreResult<Vec<M>> {
        decode_all(self.store.find(M::ENTITY, query, page)?)
    }

    /// Marks a photo as processed and links its persons and faces.
    ///
    /// Returns false if the photo does not exist.
    pub fn link_photo(&self, photo_id: &str, people: &[String], faces: &[String]) -> StoreResult<bool> {
        let mut patch = Record::new();
        patch.insert("people".into(), json!(people));
        patch.insert("faces".into(), json!(faces));
        patch.insert("faces_processed".into(), Value::Bool(true));
        self.store.update(Entity::Photo, photo_id, patch)
    }

    /// Photos of `owner` not yet linked by clustering.
    pub fn unprocessed_photos(&self, owner: &str) -> StoreResult<Vec<Photo>> {
        self.find(&unprocessed(owner), Page::all())
    }

    pub fn unprocessed_count(&self, owner: &str) -> StoreResult<usize> {
        self.store.count(Entity::Photo, &unprocessed(owner))
    }

    pub fn persons(&self, owner: &str) -> StoreResult<Vec<Person>> {
        self.find(&Query::new().eq("owner", owner), Page::all())
    }

    /// Faces clustered into the given person.
    pub fn faces_of_person(&self, person_id: &str) -> StoreResult<Vec<Face>> {
        let join = Join::new(Entity::Person, Query::by_id(person_id)).on("id", Entity::Face, "person_id");
        decode_all(self.store.join(&join)?)
    }
}

fn unprocessed(owner: &str) -> Query {
    Query::new().eq("owner", owner).eq("faces_processed", false)
}

fn decode_all<M: Model>(records: Vec<Record>) -> StoreResult<Vec<M>> {
    records.into_iter().map(from_record).collect()
}
