//! Test fixtures shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::{Datastore, StoreError};

/// Datastore that only knows which ids exist, and records every lookup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: HashSet<(String, String)>,
    records: Mutex<BTreeMap<(String, String), Value>>,
    lookups: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with(ids: &[(&str, &str)]) -> Self {
        Self {
            ids: ids
                .iter()
                .map(|(c, i)| (c.to_string(), i.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// `collection/id` for every `exists` call, in call order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.lookups.lock().unwrap().push(format!("{collection}/{id}"));
        let key = Self::key(collection, id);
        Ok(self.ids.contains(&key) || self.records.lock().unwrap().contains_key(&key))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.lock().unwrap().get(&Self::key(collection, id)).cloned())
    }

    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let key = Self::key(collection, id);
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        records.insert(key, record);
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        self.records.lock().unwrap().insert(Self::key(collection, id), record);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().unwrap().remove(&Self::key(collection, id)).is_some())
    }
}
