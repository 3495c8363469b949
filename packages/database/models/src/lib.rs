#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document keys and per-collection statistics.
//!
//! These types describe documents as stored, independent of the backing
//! store implementation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The value of a record's natural-key field.
///
/// Game data keys are almost always integers; strings are accepted so that
/// collections keyed by slugs can still be stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NaturalKey {
    /// Integer key, eligible for resume tracking.
    Int(i64),
    /// Any other scalar key.
    Text(String),
}

impl NaturalKey {
    /// Reads `field` from `record`.
    ///
    /// Returns `None` if the field is absent, null, or not a scalar that
    /// can identify a record (objects, arrays, booleans, fractional
    /// numbers).
    #[must_use]
    pub fn extract(record: &Value, field: &str) -> Option<Self> {
        match record.get(field)? {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The integer form of the key, if it has one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(_) => None,
        }
    }

    /// Type-tagged text form used as the stored row key, so `5` and `"5"`
    /// stay distinct documents.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::Int(i) => format!("i:{i}"),
            Self::Text(s) => format!("s:{s}"),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Summary of one stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    /// Collection name.
    pub collection: String,
    /// Number of stored documents.
    pub count: u64,
    /// Highest integer natural key, if any.
    pub max_key: Option<i64>,
    /// RFC 3339 timestamp of the last completed run.
    pub last_synced_at: Option<String>,
}

/// `_meta` key recording when `collection` last finished a run.
#[must_use]
pub fn last_synced_key(collection: &str) -> String {
    format!("{collection}.last_synced_at")
}

/// `_meta` key recording the document count after the last run.
#[must_use]
pub fn record_count_key(collection: &str) -> String {
    format!("{collection}.record_count")
}
