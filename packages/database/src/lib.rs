#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document store for ingested game data.
//!
//! Records are schemaless JSON documents grouped by collection and keyed by
//! a per-collection natural key. [`DocumentStore`] is the seam the ingest
//! pipeline writes through; [`document_db::DuckDbStore`] persists to a
//! single `DuckDB` file and [`memory::MemoryStore`] keeps everything in
//! process for tests and dry runs.

pub mod document_db;
pub mod memory;
pub mod paths;

use std::collections::BTreeSet;

use armory_database_models::{CollectionStats, NaturalKey, last_synced_key, record_count_key};
use async_trait::async_trait;
use serde_json::Value;

pub use document_db::DuckDbStore;
pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record has no usable value in its natural-key field.
    #[error("Record in {collection} has no usable natural key '{field}'")]
    MissingKey {
        /// Collection being written.
        collection: String,
        /// Natural-key field name.
        field: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Extracts the natural key of `record`.
///
/// # Errors
///
/// Returns [`DbError::MissingKey`] if `field` is absent or not a usable key.
pub fn key_for(collection: &str, field: &str, record: &Value) -> Result<NaturalKey, DbError> {
    NaturalKey::extract(record, field).ok_or_else(|| DbError::MissingKey {
        collection: collection.to_string(),
        field: field.to_string(),
    })
}

/// Upsert-by-natural-key document storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts `record` into `collection`, replacing any stored document
    /// with the same value in `natural_key`. Returns the key written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingKey`] if the record lacks its natural key,
    /// or a backend error if the write fails.
    async fn upsert(
        &self,
        collection: &str,
        natural_key: &str,
        record: &Value,
    ) -> Result<NaturalKey, DbError>;

    /// Fetches the stored document for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn get(&self, collection: &str, key: &NaturalKey) -> Result<Option<Value>, DbError>;

    /// The highest integer natural key in `collection`, or `None` if it
    /// has no integer-keyed documents.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn max_key(&self, collection: &str) -> Result<Option<i64>, DbError>;

    /// All integer natural keys of `collection` within `min..=max`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn integer_keys(
        &self,
        collection: &str,
        min: i64,
        max: i64,
    ) -> Result<BTreeSet<i64>, DbError>;

    /// Number of documents in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn count(&self, collection: &str) -> Result<u64, DbError>;

    /// Reads a bookkeeping value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn get_meta(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Writes a bookkeeping value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError>;

    /// Records the document count and completion time of a run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the metadata update fails.
    async fn record_sync(&self, collection: &str) -> Result<(), DbError> {
        let count = self.count(collection).await?;
        let now = chrono::Utc::now().to_rfc3339();
        self.set_meta(&record_count_key(collection), &count.to_string())
            .await?;
        self.set_meta(&last_synced_key(collection), &now).await
    }

    /// Summarizes `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any underlying query fails.
    async fn stats(&self, collection: &str) -> Result<CollectionStats, DbError> {
        Ok(CollectionStats {
            collection: collection.to_string(),
            count: self.count(collection).await?,
            max_key: self.max_key(collection).await?,
            last_synced_at: self.get_meta(&last_synced_key(collection)).await?,
        })
    }
}
