//! `DuckDB` document storage.
//!
//! All collections share one `DuckDB` file with a `documents` table keyed by
//! `(collection, natural_key)` and a `_meta` table for run bookkeeping.
//! `natural_key` holds [`NaturalKey::storage_key`], so integer and string
//! keys with the same text never share a row.
//! Integer keys are mirrored into `key_num` so resume queries can use
//! `MAX()` and range scans.
//!
//! `duckdb::Connection` is `Send` but not `Sync`, so the store keeps one
//! connection behind a mutex and runs every statement on the blocking pool.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use armory_database_models::NaturalKey;
use async_trait::async_trait;
use duckdb::Connection;
use serde_json::Value;

use crate::{DbError, DocumentStore, key_for};

/// Opens (or creates) the document database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection or schema creation
/// fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch(
        "SET threads = 4;
         SET memory_limit = '512MB';",
    )?;

    create_schema(&conn)?;

    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            natural_key TEXT NOT NULL,
            key_num BIGINT,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, natural_key)
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}

/// Inserts or replaces one document.
///
/// # Errors
///
/// Returns [`DbError`] if serialization or the upsert fails.
pub fn upsert_document(
    conn: &Connection,
    collection: &str,
    key: &NaturalKey,
    record: &Value,
) -> Result<(), DbError> {
    let body = serde_json::to_string(record)?;
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO documents (collection, natural_key, key_num, body, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (collection, natural_key) DO UPDATE SET
            key_num = EXCLUDED.key_num,
            body = EXCLUDED.body,
            updated_at = EXCLUDED.updated_at",
        duckdb::params![collection, key.storage_key(), key.as_int(), body, now],
    )?;

    Ok(())
}

/// Reads one document.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the stored body is not JSON.
pub fn get_document(
    conn: &Connection,
    collection: &str,
    key: &NaturalKey,
) -> Result<Option<Value>, DbError> {
    let mut stmt =
        conn.prepare("SELECT body FROM documents WHERE collection = ? AND natural_key = ?")?;
    let result: Result<String, _> =
        stmt.query_row(duckdb::params![collection, key.storage_key()], |row| row.get(0));
    match result {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Returns the highest integer key in `collection`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_max_key(conn: &Connection, collection: &str) -> Result<Option<i64>, DbError> {
    let mut stmt = conn.prepare("SELECT MAX(key_num) FROM documents WHERE collection = ?")?;
    let max: Option<i64> = stmt.query_row([collection], |row| row.get(0))?;
    Ok(max)
}

/// Returns the integer keys of `collection` within `min..=max`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_integer_keys(
    conn: &Connection,
    collection: &str,
    min: i64,
    max: i64,
) -> Result<BTreeSet<i64>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT key_num FROM documents
         WHERE collection = ? AND key_num IS NOT NULL AND key_num BETWEEN ? AND ?",
    )?;
    let keys = stmt
        .query_map(duckdb::params![collection, min, max], |row| row.get(0))?
        .collect::<Result<BTreeSet<i64>, _>>()?;
    Ok(keys)
}

/// Returns the number of documents in `collection`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_record_count(conn: &Connection, collection: &str) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM documents WHERE collection = ?")?;
    let count: i64 = stmt.query_row([collection], |row| row.get(0))?;
    u64::try_from(count).map_err(|e| DbError::Conversion {
        message: format!("negative document count {count}: {e}"),
    })
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// [`DocumentStore`] backed by a single `DuckDB` file.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        log::info!("Opening document store at {}", path.display());
        Ok(Self::from_connection(open(path)?))
    }

    /// Opens an in-memory `DuckDB` database with the same schema.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl DocumentStore for DuckDbStore {
    async fn upsert(
        &self,
        collection: &str,
        natural_key: &str,
        record: &Value,
    ) -> Result<NaturalKey, DbError> {
        let key = key_for(collection, natural_key, record)?;
        let collection = collection.to_string();
        let record = record.clone();
        let written = key.clone();
        self.run(move |conn| upsert_document(conn, &collection, &written, &record))
            .await?;
        Ok(key)
    }

    async fn get(&self, collection: &str, key: &NaturalKey) -> Result<Option<Value>, DbError> {
        let collection = collection.to_string();
        let key = key.clone();
        self.run(move |conn| get_document(conn, &collection, &key))
            .await
    }

    async fn max_key(&self, collection: &str) -> Result<Option<i64>, DbError> {
        let collection = collection.to_string();
        self.run(move |conn| get_max_key(conn, &collection)).await
    }

    async fn integer_keys(
        &self,
        collection: &str,
        min: i64,
        max: i64,
    ) -> Result<BTreeSet<i64>, DbError> {
        let collection = collection.to_string();
        self.run(move |conn| get_integer_keys(conn, &collection, min, max))
            .await
    }

    async fn count(&self, collection: &str) -> Result<u64, DbError> {
        let collection = collection.to_string();
        self.run(move |conn| get_record_count(conn, &collection))
            .await
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        let key = key.to_string();
        self.run(move |conn| get_meta(conn, &key)).await
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |conn| set_meta(conn, &key, &value)).await
    }
}
