use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use routeforge_core::{Datastore, StoreError};

/// In-memory datastore for tests/dev.
///
/// Records are keyed by `(collection, id)`; the ordered map keeps `list`
/// sorted by id without extra work.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    inner: RwLock<BTreeMap<(String, String), Value>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (test fixtures, dev data).
    pub fn seeded(self, collection: &str, id: &str, record: Value) -> Self {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key(collection, id), record);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(collection: &str, id: &str) -> (String, String) {
    (collection.to_string(), id.to_string())
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory datastore lock poisoned".to_string())
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.contains_key(&key(collection, id)))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&key(collection, id)).cloned())
    }

    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let k = key(collection, id);
        if map.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        map.insert(k, record);
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(key(collection, id), record);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter_map(|((c, _id), v)| if c == collection { Some(v.clone()) } else { None })
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(&key(collection, id)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn collections_are_isolated_and_listed_by_id() {
        let store = InMemoryDatastore::new();
        store.insert("wallet__assets", "eth", json!({"id": "eth"})).await.unwrap();
        store.insert("wallet__assets", "btc", json!({"id": "btc"})).await.unwrap();
        store.insert("wallet__transactions", "btc", json!({"id": "t"})).await.unwrap();

        assert!(store.exists("wallet__assets", "btc").await.unwrap());
        assert!(!store.exists("wallet__assets", "doge").await.unwrap());

        let ids: Vec<_> = store
            .list("wallet__assets")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["btc", "eth"]);
    }

    #[tokio::test]
    async fn insert_rejects_duplicates_put_replaces() {
        let store = InMemoryDatastore::new().seeded("c", "1", json!({"v": 1}));
        let err = store.insert("c", "1", json!({"v": 2})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        store.put("c", "1", json!({"v": 3})).await.unwrap();
        assert_eq!(store.get("c", "1").await.unwrap(), Some(json!({"v": 3})));

        assert!(store.delete("c", "1").await.unwrap());
        assert!(!store.delete("c", "1").await.unwrap());
        assert!(store.is_empty());
    }
}
