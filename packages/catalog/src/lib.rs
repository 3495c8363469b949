#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog of the game data collections to ingest.
//!
//! Each collection is described by a TOML file embedded at compile time
//! (see [`registry`]). A [`definition::CollectionDefinition`] knows how to
//! build request URLs for its records and how to turn a response body into
//! the documents that get persisted.

pub mod definition;
pub mod registry;

pub use definition::{CollectionDefinition, CollectionKind};
pub use registry::{all_collections, find_collection};

/// Errors from loading or applying collection definitions.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The TOML file could not be parsed.
    #[error("Failed to parse {name}: {source}")]
    Parse {
        /// File name of the offending config.
        name: String,
        /// Parser error.
        source: toml::de::Error,
    },

    /// The config parsed but is inconsistent.
    #[error("Invalid collection {id}: {message}")]
    Invalid {
        /// Collection id.
        id: String,
        /// What is wrong with it.
        message: String,
    },

    /// A response body did not contain the configured records path.
    #[error("Response for {collection} has no value at '{path}'")]
    MissingPath {
        /// Collection id.
        collection: String,
        /// Dot path that was looked up.
        path: String,
    },
}
