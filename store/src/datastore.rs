use std::fmt;

use serde_json::{Map, Value};

use crate::StoreResult;

/// A stored document: a JSON object with a string `id` field.
pub type Record = Map<String, Value>;

/// Collections known to the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Photo,
    Person,
    Face,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Photo, Entity::Person, Entity::Face];

    /// Collection / table name.
    pub fn table(self) -> &'static str {
        match self {
            Entity::Photo => "photos",
            Entity::Person => "person",
            Entity::Face => "face",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Conjunction of field equality conditions.
///
/// A condition on a field holding an array matches when the array contains
/// the value. An empty query matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Value)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the record with the given id.
    pub fn by_id(id: &str) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(field, want)| match record.get(field) {
            Some(Value::Array(items)) if !want.is_array() => items.contains(want),
            Some(got) => got == want,
            None => want.is_null(),
        })
    }
}

/// Pagination window for [`Datastore::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub page: usize,
}

impl Page {
    /// Every matching record.
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            page: 0,
        }
    }

    pub fn skip(&self) -> usize {
        self.page.saturating_mul(self.limit)
    }

    /// Applies the window to an ordered sequence of matches.
    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items.skip(self.skip()).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 100, page: 0 }
    }
}

/// Relates records of two entities by key equality.
///
/// Selects the `left` records matching `filter`, collects their `left_key`
/// values, and returns the `right` records whose `right_key` equals one of
/// them (array fields match on containment).
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Entity,
    pub filter: Query,
    pub left_key: String,
    pub right: Entity,
    pub right_key: String,
}

impl Join {
    pub fn new(left: Entity, filter: Query) -> Self {
        Self {
            left,
            filter,
            left_key: "id".into(),
            right: left,
            right_key: "id".into(),
        }
    }

    pub fn on(mut self, left_key: &str, right: Entity, right_key: &str) -> Self {
        self.left_key = left_key.into();
        self.right = right;
        self.right_key = right_key.into();
        self
    }
}

/// Document-style persistence capability.
///
/// One implementation per backend, chosen at construction; callers never
/// inspect the concrete type. Implementations must be safe for concurrent
/// use.
pub trait Datastore: Send + Sync {
    /// Inserts a record. Fails with `Conflict` if the id exists.
    fn insert(&self, entity: Entity, record: Record) -> StoreResult<()>;

    /// Inserts records atomically: either all are stored or none.
    fn insert_many(&self, entity: Entity, records: Vec<Record>) -> StoreResult<()>;

    /// Returns matching records in backend order, windowed by `page`.
    fn find(&self, entity: Entity, query: &Query, page: Page) -> StoreResult<Vec<Record>>;

    fn find_by_id(&self, entity: Entity, id: &str) -> StoreResult<Option<Record>>;

    fn count(&self, entity: Entity, query: &Query) -> StoreResult<usize>;

    /// Shallow-merges `patch` into the record. The `id` field is never
    /// changed. Returns false if no record has that id.
    fn update(&self, entity: Entity, id: &str, patch: Record) -> StoreResult<bool>;

    /// Deletes every matching record and returns how many were removed.
    fn delete(&self, entity: Entity, query: &Query) -> StoreResult<usize>;

    /// Returns the right-hand records of a [`Join`].
    fn join(&self, join: &Join) -> StoreResult<Vec<Record>> {
        let keys: Vec<Value> = self
            .find(join.left, &join.filter, Page::all())?
            .into_iter()
            .filter_map(|mut r| r.remove(&join.left_key))
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let right = self.find(join.right, &Query::new(), Page::all())?;
        Ok(right
            .into_iter()
            .filter(|r| match r.get(&join.right_key) {
                Some(Value::Array(items)) => items.iter().any(|v| keys.contains(v)),
                Some(v) => keys.contains(v),
                None => false,
            })
            .collect())
    }
}

impl fmt::Debug for dyn Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Datastore {{ ... }}")
    }
}

/// Merges `patch` into `record`, leaving `id` untouched.
pub(crate) fn merge_patch(record: &mut Record, patch: Record) {
    for (k, v) in patch {
        if k != "id" {
            record.insert(k, v);
        }
    }
}
