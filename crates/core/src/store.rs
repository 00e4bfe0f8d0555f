//! Storage collaborator contract.
//!
//! The framework only needs [`Datastore::exists`] for existence checks; the
//! remaining primitives are what module callbacks use for their own records.
//! Records are JSON documents addressed by `(collection, id)`. Collection
//! names follow the `<module>__<name>` convention (`wallet__assets`).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert a new record; fails with [`StoreError::AlreadyExists`] on conflict.
    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError>;

    /// Insert or replace.
    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError>;

    /// All records of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}
