//! Redb-based persistent datastore.

use std::fmt::Display;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::codec::record_id;
use crate::datastore::{Datastore, Entity, Page, Query, Record, merge_patch};
use crate::{StoreError, StoreResult};

fn table(entity: Entity) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(entity.table())
}

fn storage<E: Display>(e: E) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn encode(record: &Record) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

fn decode(bytes: &[u8]) -> StoreResult<Record> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A persistent [`Datastore`] backed by redb.
///
/// Each entity lives in its own table keyed by record id, with JSON-encoded
/// values. Scans return records in id order.
pub struct RedbDatastore {
    db: Database,
}

impl RedbDatastore {
    /// Opens or creates a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        // Create every table up front so read transactions can open them.
        let tx = db.begin_write().map_err(storage)?;
        for entity in Entity::ALL {
            tx.open_table(table(entity)).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        debug!("opened redb datastore at {}", path.as_ref().display());
        Ok(Self { db })
    }

    /// Decodes every record of an entity, in id order.
    fn scan(&self, entity: Entity) -> StoreResult<Vec<Record>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let t = tx.open_table(table(entity)).map_err(storage)?;

        let mut records = Vec::new();
        for item in t.iter().map_err(storage)? {
            let (_, value) = item.map_err(storage)?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }
}

impl Datastore for RedbDatastore {
    fn insert(&self, entity: Entity, record: Record) -> StoreResult<()> {
        self.insert_many(entity, vec![record])
    }

    fn insert_many(&self, entity: Entity, records: Vec<Record>) -> StoreResult<()> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut t = tx.open_table(table(entity)).map_err(storage)?;
            for record in &records {
                let id = record_id(record)?;
                if t.get(id).map_err(storage)?.is_some() {
                    // Dropping the transaction without commit aborts it.
                    debug!("aborting batch of {} {}: duplicate id {}", records.len(), entity.table(), id);
                    return Err(StoreError::Conflict {
                        entity: entity.table(),
                        id: id.to_string(),
                    });
                }
                let bytes = encode(record)?;
                t.insert(id, bytes.as_slice()).map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }

    fn find(&self, entity: Entity, query: &Query, page: Page) -> StoreResult<Vec<Record>> {
        let records = self.scan(entity)?;
        Ok(page.apply(records.into_iter().filter(|r| query.matches(r))))
    }

    fn find_by_id(&self, entity: Entity, id: &str) -> StoreResult<Option<Record>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let t = tx.open_table(table(entity)).map_err(storage)?;
        let found = match t.get(id).map_err(storage)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(found)
    }

    fn count(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
        Ok(self.scan(entity)?.iter().filter(|r| query.matches(r)).count())
    }

    fn update(&self, entity: Entity, id: &str, patch: Record) -> StoreResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let found = {
            let mut t = tx.open_table(table(entity)).map_err(storage)?;
            let existing = match t.get(id).map_err(storage)? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            match existing {
                Some(mut record) => {
                    merge_patch(&mut record, patch);
                    let bytes = encode(&record)?;
                    t.insert(id, bytes.as_slice()).map_err(storage)?;
                    true
                }
                None => false,
            }
        };
        if found {
            tx.commit().map_err(storage)?;
        } else {
            debug!("no {} record {}, aborting update", entity.table(), id);
            tx.abort().map_err(storage)?;
        }
        Ok(found)
    }

    fn delete(&self, entity: Entity, query: &Query) -> StoreResult<usize> {
        let tx = self.db.begin_write().map_err(storage)?;
        let removed = {
            let mut t = tx.open_table(table(entity)).map_err(storage)?;

            let mut ids = Vec::new();
            for item in t.iter().map_err(storage)? {
                let (key, value) = item.map_err(storage)?;
                if query.matches(&decode(value.value())?) {
                    ids.push(key.value().to_string());
                }
            }
            for id in &ids {
                t.remove(id.as_str()).map_err(storage)?;
            }
            ids.len()
        };
        tx.commit().map_err(storage)?;
        Ok(removed)
    }
}
