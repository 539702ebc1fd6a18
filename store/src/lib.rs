//! Persistence for clustering results.
//!
//! Photos, persons and faces are stored as JSON-like [`Record`]s behind the
//! [`Datastore`] capability trait, with an in-memory implementation for tests
//! and a redb-based implementation for persistence. [`Repository`] maps the
//! typed models onto records through [`codec`].

pub mod codec;
mod datastore;
mod error;
pub mod memory;
mod models;
pub mod redb;
mod repository;

pub use datastore::{Datastore, Entity, Join, Page, Query, Record};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryDatastore;
pub use models::{Face, Model, Person, Photo};
pub use self::redb::RedbDatastore;
pub use repository::Repository;
