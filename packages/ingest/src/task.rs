//! Units of work for the worker pool.

use std::fmt;
use std::sync::Arc;

use armory_catalog::CollectionDefinition;

/// One request's worth of work.
#[derive(Debug, Clone)]
pub enum Task {
    /// Fetch a listing endpoint and store every record it returns.
    Listing {
        /// Collection being ingested.
        collection: Arc<CollectionDefinition>,
    },
    /// Fetch and store a single record by ID.
    Item {
        /// Collection being ingested.
        collection: Arc<CollectionDefinition>,
        /// Record ID substituted into the endpoint.
        id: i64,
    },
}

impl Task {
    /// The collection this task writes to.
    #[must_use]
    pub fn collection(&self) -> &CollectionDefinition {
        match self {
            Self::Listing { collection } | Self::Item { collection, .. } => collection,
        }
    }

    /// The record ID, for per-ID tasks.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        match self {
            Self::Item { id, .. } => Some(*id),
            Self::Listing { .. } => None,
        }
    }

    /// Request URL for this task.
    #[must_use]
    pub fn url(&self, base_url: &str, locale: &str) -> String {
        match self {
            Self::Listing { collection } => collection.listing_url(base_url, locale),
            Self::Item { collection, id } => collection.item_url(base_url, locale, *id),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing { collection } => write!(f, "{} (listing)", collection.id),
            Self::Item { collection, id } => write!(f, "{}#{id}", collection.id),
        }
    }
}
