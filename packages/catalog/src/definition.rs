//! Config-driven collection definition.
//!
//! [`CollectionDefinition`] captures everything unique about one collection:
//! where to fetch it, which field identifies a record, and how to pull the
//! records out of a response body.

use serde::Deserialize;
use serde_json::Value;

use crate::CatalogError;

/// Placeholder substituted with the record ID in per-ID endpoints.
pub const ID_PLACEHOLDER: &str = "{id}";

fn default_natural_key() -> String {
    "id".to_string()
}

/// A single ingestible collection, loaded from embedded TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionDefinition {
    /// Store collection name (e.g., `"items"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Endpoint path relative to the API base URL. Per-ID kinds contain an
    /// `{id}` placeholder.
    pub endpoint: String,
    /// Field that uniquely identifies a record within the collection.
    #[serde(default = "default_natural_key")]
    pub natural_key: String,
    /// Dot-separated path to the records inside the response body.
    #[serde(default)]
    pub records_path: Option<String>,
    /// How records are enumerated.
    pub kind: CollectionKind,
}

/// How the records of a collection are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionKind {
    /// One request per ID in `min_id..=max_id`.
    Data {
        /// First ID to request.
        #[serde(default)]
        min_id: i64,
        /// Last ID to request (inclusive).
        max_id: i64,
    },
    /// A single listing request returning every record.
    Collection,
}

impl CollectionDefinition {
    /// The inclusive ID range for per-ID collections.
    #[must_use]
    pub const fn id_range(&self) -> Option<(i64, i64)> {
        match self.kind {
            CollectionKind::Data { min_id, max_id } => Some((min_id, max_id)),
            CollectionKind::Collection => None,
        }
    }

    /// Request URL for record `id` of a per-ID collection.
    #[must_use]
    pub fn item_url(&self, base_url: &str, locale: &str, id: i64) -> String {
        let path = self.endpoint.replace(ID_PLACEHOLDER, &id.to_string());
        join_url(base_url, &path, locale)
    }

    /// Request URL for the listing endpoint of a bulk collection.
    #[must_use]
    pub fn listing_url(&self, base_url: &str, locale: &str) -> String {
        join_url(base_url, &self.endpoint, locale)
    }

    /// Extracts the documents to persist from a response body.
    ///
    /// For bulk collections the value at `records_path` (or the body) is
    /// expected to be an array, one document per element; anything else is
    /// a single document. Per-ID collections always yield one document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MissingPath`] if `records_path` is set and
    /// absent from `body`.
    pub fn shape(&self, body: Value) -> Result<Vec<Value>, CatalogError> {
        let value = match &self.records_path {
            Some(path) => take_path(body, path).ok_or_else(|| CatalogError::MissingPath {
                collection: self.id.clone(),
                path: path.clone(),
            })?,
            None => body,
        };

        Ok(match (self.kind, value) {
            (CollectionKind::Collection, Value::Array(records)) => records,
            (_, record) => vec![record],
        })
    }

    /// Checks that the definition is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |message: &str| CatalogError::Invalid {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.is_empty() || self.name.is_empty() {
            return Err(invalid("id and name must be non-empty"));
        }
        if self.natural_key.is_empty() {
            return Err(invalid("natural_key must be non-empty"));
        }

        let templated = self.endpoint.contains(ID_PLACEHOLDER);
        match self.kind {
            CollectionKind::Data { min_id, max_id } => {
                if !templated {
                    return Err(invalid("per-ID endpoint is missing the {id} placeholder"));
                }
                if min_id < 0 || min_id > max_id {
                    return Err(invalid("expected 0 <= min_id <= max_id"));
                }
            }
            CollectionKind::Collection => {
                if templated {
                    return Err(invalid("listing endpoint must not contain {id}"));
                }
            }
        }

        Ok(())
    }
}

fn join_url(base_url: &str, path: &str, locale: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{base}{path}{sep}locale={locale}")
}

fn take_path(mut value: Value, path: &str) -> Option<Value> {
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        value = match value {
            Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Parses a single collection TOML.
///
/// # Errors
///
/// Returns [`CatalogError`] if the TOML is malformed or fails validation.
pub fn parse_collection_toml(name: &str, toml_str: &str) -> Result<CollectionDefinition, CatalogError> {
    let definition: CollectionDefinition =
        toml::de::from_str(toml_str).map_err(|source| CatalogError::Parse {
            name: name.to_string(),
            source,
        })?;
    definition.validate()?;
    Ok(definition)
}
