//! In-memory datastore for testing and ephemeral runs.

use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::IndexMap;

use crate::codec::record_id;
use crate::datastore::{Datastore, Entity, Page, Query, Record, merge_patch};
use crate::{StoreError, StoreResult};

type Tables = HashMap<Entity, IndexMap<String, Record>>;

/// A [`Datastore`] keeping each entity in an insertion-ordered map.
/// Data is lost when the store is dropped.
pub struct MemoryDatastore {
    tables: RwLock<Tables>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        f(&mut tables)
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for MemoryDatastore {
    fn insert(&self, entity: Entity, record: Record) -> StoreResult<()> {
        self.insert_many(entity, vec![record])
    }

    fn insert_many(&self, entity: Entity, records: Vec<Record>) -> StoreResult<()> {
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            keyed.push((record_id(&record)?.to_string(), record));
        }

        self.write(|tables| {
            let table = tables.entry(entity).or_default();
            for (i, (id, _)) in keyed.iter().enumerate() {
                let repeated = keyed[..i].iter().any(|(prev, _)| prev == id);
                if repeated || table.contains_key(id) {
                    return Err(StoreError::Conflict {
                        entity: entity.table(),
                        id: id.clone(),
                    });
                }
            }
            table.extend(keyed);
            Ok(())
        })
    }

    fn find(&self, entity: Entity, query: &Query, page: Page) -> StoreResult<Vec<Record>> {
        self.read(|tables| match tables.get(&entity) {
            Some(table) => page.apply(table.values().filter(|r| query.matches(r)).cloned()),
            None => Vec::new(),
        })
    }

    fn find_by_id(&self, entity: Entity, id: &str) -> StoreResult<Option<Record>> {
        self.read(|tables| tables.get(&entity).and_then(|t| t.get(id)).cloned())
    }

    fn count(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
        self.read(|tables| {
            tables
                .get(&entity)
                .map_or(0, |t| t.values().filter(|r| query.matches(r)).count())
        })
    }

    fn update(&self, entity: Entity, id: &str, patch: Record) -> StoreResult<bool> {
        self.write(|tables| {
            match tables.get_mut(&entity).and_then(|t| t.get_mut(id)) {
                Some(record) => {
                    merge_patch(record, patch);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
        self.write(|tables| {
            let Some(table) = tables.get_mut(&entity) else {
                return Ok(0);
            };
            let before = table.len();
            table.retain(|_, r| !query.matches(r));
            Ok(before - table.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Join;
    use serde_json::{Value, json};

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn insert_find_update_delete() {
        let store = MemoryDatastore::new();
        store
            .insert(Entity::Photo, record(json!({"id": "p1", "owner": "u1", "faces_processed": false})))
            .unwrap();
        store
            .insert(Entity::Photo, record(json!({"id": "p2", "owner": "u2", "faces_processed": false})))
            .unwrap();

        let found = store
            .find(Entity::Photo, &Query::new().eq("owner", "u1"), Page::default())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "p1");

        assert!(store
            .update(Entity::Photo, "p1", record(json!({"faces_processed": true})))
            .unwrap());
        assert!(!store
            .update(Entity::Photo, "missing", record(json!({"faces_processed": true})))
            .unwrap());
        let p1 = store.find_by_id(Entity::Photo, "p1").unwrap().unwrap();
        assert_eq!(p1["faces_processed"], true);
        assert_eq!(p1["owner"], "u1");

        assert_eq!(store.count(Entity::Photo, &Query::new()).unwrap(), 2);
        assert_eq!(store.delete(Entity::Photo, &Query::by_id("p2")).unwrap(), 1);
        assert_eq!(store.count(Entity::Photo, &Query::new()).unwrap(), 1);
        assert_eq!(store.count(Entity::Face, &Query::new()).unwrap(), 0);
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let store = MemoryDatastore::new();
        store.insert(Entity::Face, record(json!({"id": "f1"}))).unwrap();

        let err = store
            .insert_many(
                Entity::Face,
                vec![record(json!({"id": "f2"})), record(json!({"id": "f1"}))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.count(Entity::Face, &Query::new()).unwrap(), 1);

        let err = store
            .insert_many(
                Entity::Face,
                vec![record(json!({"id": "f3"})), record(json!({"id": "f3"}))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        assert!(matches!(
            store.insert(Entity::Face, record(json!({"name": "no id"}))),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn find_keeps_insertion_order_and_pages() {
        let store = MemoryDatastore::new();
        for id in ["c", "a", "b"] {
            store.insert(Entity::Person, record(json!({"id": id}))).unwrap();
        }
        let ids: Vec<Value> = store
            .find(Entity::Person, &Query::new(), Page::all())
            .unwrap()
            .into_iter()
            .map(|mut r| r.remove("id").unwrap())
            .collect();
        assert_eq!(ids, vec![json!("c"), json!("a"), json!("b")]);

        let second = store
            .find(Entity::Person, &Query::new(), Page { limit: 2, page: 1 })
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["id"], "b");
    }

    #[test]
    fn join_follows_foreign_keys() {
        let store = MemoryDatastore::new();
        store
            .insert(Entity::Person, record(json!({"id": "alice", "owner": "u1"})))
            .unwrap();
        store
            .insert(Entity::Person, record(json!({"id": "bob", "owner": "u2"})))
            .unwrap();
        store
            .insert_many(
                Entity::Face,
                vec![
                    record(json!({"id": "f1", "person_id": "alice"})),
                    record(json!({"id": "f2", "person_id": "bob"})),
                    record(json!({"id": "f3", "person_id": "alice"})),
                ],
            )
            .unwrap();

        let faces = store
            .join(&Join::new(Entity::Person, Query::new().eq("owner", "u1")).on("id", Entity::Face, "person_id"))
            .unwrap();
        let ids: Vec<&Value> = faces.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec!["f1", "f3"]);

        let none = store
            .join(&Join::new(Entity::Person, Query::new().eq("owner", "u9")).on("id", Entity::Face, "person_id"))
            .unwrap();
        assert!(none.is_empty());
    }
}
