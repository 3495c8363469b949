//! Resumption planning for per-ID collections.
//!
//! The store is the only progress record: the highest integer natural key
//! already persisted marks where the previous run got to.

use armory_catalog::CollectionDefinition;
use armory_database::{DbError, DocumentStore};
use armory_ingest_models::GapPolicy;

/// IDs to request for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// Missing IDs below the resume marker (only with
    /// [`GapPolicy::Revisit`]).
    pub gaps: Vec<i64>,
    /// First ID of the fresh range.
    pub start: i64,
    /// Last ID of the fresh range (inclusive). `start > end` means the
    /// range is already complete.
    pub end: i64,
}

impl ResumePlan {
    /// Whether there is nothing left to request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty() && self.start > self.end
    }

    /// Number of IDs in the plan.
    #[must_use]
    pub fn len(&self) -> u64 {
        let fresh = if self.start > self.end {
            0
        } else {
            self.end.abs_diff(self.start) + 1
        };
        self.gaps.len() as u64 + fresh
    }

    /// Every ID in the plan: gaps first, then the fresh range.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.gaps.iter().copied().chain(self.start..=self.end)
    }
}

/// The highest integer key stored for `collection`, or `None` if empty.
///
/// # Errors
///
/// Returns [`DbError`] if the store query fails.
pub async fn last_persisted_key(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Option<i64>, DbError> {
    store.max_key(collection).await
}

/// Plans the IDs to request for `definition`.
///
/// Returns `None` for listing collections, which are always fetched in
/// full.
///
/// # Errors
///
/// Returns [`DbError`] if a store query fails.
pub async fn plan(
    store: &dyn DocumentStore,
    definition: &CollectionDefinition,
    force: bool,
    gap_policy: GapPolicy,
) -> Result<Option<ResumePlan>, DbError> {
    let Some((min_id, max_id)) = definition.id_range() else {
        return Ok(None);
    };
    let id = definition.id.as_str();

    if force {
        log::info!("{id}: full sync from {min_id} (--force)");
        return Ok(Some(ResumePlan {
            gaps: Vec::new(),
            start: min_id,
            end: max_id,
        }));
    }

    let Some(last) = last_persisted_key(store, id).await? else {
        log::info!("{id}: first run, requesting {min_id}..={max_id}");
        return Ok(Some(ResumePlan {
            gaps: Vec::new(),
            start: min_id,
            end: max_id,
        }));
    };

    let start = last.saturating_add(1).max(min_id);

    let gaps = match gap_policy {
        GapPolicy::Skip => Vec::new(),
        GapPolicy::Revisit => {
            let upper = last.min(max_id);
            if upper < min_id {
                Vec::new()
            } else {
                let stored = store.integer_keys(id, min_id, upper).await?;
                (min_id..=upper).filter(|k| !stored.contains(k)).collect()
            }
        }
    };

    let plan = ResumePlan {
        gaps,
        start,
        end: max_id,
    };

    if start > max_id {
        log::info!(
            "{id}: range complete (last stored key {last} >= max {max_id}){}",
            if plan.gaps.is_empty() {
                String::new()
            } else {
                format!(", revisiting {} gap(s)", plan.gaps.len())
            }
        );
    } else {
        log::info!(
            "{id}: resuming at {start} (last stored key {last}), {} ID(s) to request",
            plan.len()
        );
    }

    Ok(Some(plan))
}
