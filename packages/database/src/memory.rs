//! In-process document store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use armory_database_models::NaturalKey;
use async_trait::async_trait;
use serde_json::Value;

use crate::{DbError, DocumentStore, key_for};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<NaturalKey, Value>>,
    meta: HashMap<String, String>,
}

/// Map-backed [`DocumentStore`] used by tests and `--in-memory` runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        natural_key: &str,
        record: &Value,
    ) -> Result<NaturalKey, DbError> {
        let key = key_for(collection, natural_key, record)?;
        self.inner()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), record.clone());
        Ok(key)
    }

    async fn get(&self, collection: &str, key: &NaturalKey) -> Result<Option<Value>, DbError> {
        Ok(self
            .inner()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn max_key(&self, collection: &str) -> Result<Option<i64>, DbError> {
        Ok(self
            .inner()
            .collections
            .get(collection)
            .and_then(|docs| docs.keys().filter_map(NaturalKey::as_int).max()))
    }

    async fn integer_keys(
        &self,
        collection: &str,
        min: i64,
        max: i64,
    ) -> Result<BTreeSet<i64>, DbError> {
        Ok(self
            .inner()
            .collections
            .get(collection)
            .map(|docs| {
                docs.keys()
                    .filter_map(NaturalKey::as_int)
                    .filter(|k| (min..=max).contains(k))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<u64, DbError> {
        let len = self
            .inner()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len);
        u64::try_from(len).map_err(|e| DbError::Conversion {
            message: e.to_string(),
        })
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.inner().meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.inner().meta.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
