#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bulk ingestion of game data into the document store.
//!
//! An [`Ingester`] plans the IDs each collection still needs, feeds them to
//! a fixed-size [`pool::WorkerPool`], and lets every worker fetch, govern
//! and persist one record at a time. Credentials and quota pauses are
//! shared through the [`QuotaCoordinator`] held by the fetch client.

pub mod config;
pub mod executor;
pub mod pool;
pub mod reindex;
pub mod resume;
pub mod status;
pub mod task;

use std::sync::Arc;
use std::time::{Duration, Instant};

use armory_api::client::FetchClient;
use armory_api::coordinator::QuotaCoordinator;
use armory_api::credentials::CredentialRotator;
use armory_api::governor::RateGovernor;
use armory_api::progress::{ProgressCallback, null_progress};
use armory_api::ApiError;
use armory_catalog::{CollectionDefinition, CollectionKind};
use armory_database::DocumentStore;
use armory_ingest_models::{IngestOptions, PoolSummary};

use crate::config::IngestConfig;
use crate::executor::IngestExecutor;
use crate::pool::WorkerPool;
use crate::status::IngestStatus;
use crate::task::Task;

/// Environment variable restricting which collections are ingested.
pub const COLLECTIONS_ENV: &str = "ARMORY_COLLECTIONS";

/// Errors that abort an ingest run or its setup.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// API setup error (credentials, token exchange).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing or inconsistent configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },

    /// The requested collection is not in the catalog.
    #[error("Unknown collection: {id} (available: {available})")]
    UnknownCollection {
        /// Requested id.
        id: String,
        /// Comma-separated list of known ids.
        available: String,
    },
}

/// Returns all configured collections from the embedded catalog.
#[must_use]
pub fn all_collections() -> Vec<CollectionDefinition> {
    armory_catalog::all_collections()
}

/// Looks up one collection by id.
///
/// # Errors
///
/// Returns [`IngestError::UnknownCollection`] if `id` is not in the catalog.
pub fn collection(id: &str) -> Result<CollectionDefinition, IngestError> {
    armory_catalog::find_collection(id).ok_or_else(|| IngestError::UnknownCollection {
        id: id.to_string(),
        available: collection_ids(&all_collections()),
    })
}

/// Returns the collections to sync, filtered by the `--collections` CLI
/// flag or the `ARMORY_COLLECTIONS` environment variable. If neither is
/// set, all collections are returned.
#[must_use]
pub fn enabled_collections(cli_filter: Option<String>) -> Vec<CollectionDefinition> {
    let filter = cli_filter.or_else(|| std::env::var(COLLECTIONS_ENV).ok());

    let all = all_collections();

    let Some(filter_str) = filter else {
        return all;
    };

    let ids: Vec<&str> = filter_str.split(',').map(str::trim).collect();

    let (filtered, rest): (Vec<_>, Vec<_>) = all
        .into_iter()
        .partition(|c| ids.contains(&c.id.as_str()));

    if filtered.is_empty() {
        log::warn!(
            "No matching collections found for filter {ids:?}. Available: {}",
            collection_ids(&rest)
        );
    }

    filtered
}

fn collection_ids(collections: &[CollectionDefinition]) -> String {
    collections
        .iter()
        .map(|c| c.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the HTTP client used for every API call.
///
/// # Errors
///
/// Returns [`IngestError::Http`] if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, IngestError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("armory/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// Builds the shared coordinator from the configured credentials.
///
/// # Errors
///
/// Returns [`IngestError`] if no credentials are configured or a token
/// exchange fails.
pub async fn build_coordinator(
    config: &IngestConfig,
    http: &reqwest::Client,
) -> Result<Arc<QuotaCoordinator>, IngestError> {
    let credentials = config.credentials(http).await?;
    let rotator = CredentialRotator::new(credentials)?;
    Ok(Arc::new(QuotaCoordinator::new(
        rotator,
        RateGovernor::default(),
    )))
}

/// Runs collections through a shared worker pool.
pub struct Ingester {
    http: reqwest::Client,
    coordinator: Arc<QuotaCoordinator>,
    store: Arc<dyn DocumentStore>,
    config: IngestConfig,
    options: IngestOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl Ingester {
    /// Creates an ingester. Progress is not displayed until
    /// [`Self::with_progress`] is called.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        coordinator: Arc<QuotaCoordinator>,
        store: Arc<dyn DocumentStore>,
        config: IngestConfig,
        options: IngestOptions,
    ) -> Self {
        Self {
            http,
            coordinator,
            store,
            config,
            options,
            progress: null_progress(),
        }
    }

    /// Reports task progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The shared coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<QuotaCoordinator> {
        &self.coordinator
    }

    /// Ingests `collections` until every planned task has run, then
    /// records sync metadata and triggers the reindex hook.
    ///
    /// Per-task failures are logged and counted in the summary; they never
    /// abort the run.
    pub async fn run(&self, collections: &[CollectionDefinition]) -> PoolSummary {
        let start = Instant::now();
        log::info!(
            "Ingesting {} collection(s) with {} worker(s): {}",
            collections.len(),
            self.options.workers,
            collection_ids(collections)
        );

        let status = Arc::new(IngestStatus::new(
            Some(Arc::clone(&self.coordinator)),
            Arc::clone(&self.progress),
        ));

        let client = FetchClient::new(self.http.clone(), Arc::clone(&self.coordinator))
            .with_throttle_delay(self.options.throttle_delay)
            .with_max_throttle_attempts(self.options.max_throttle_attempts);
        let executor = Arc::new(IngestExecutor::new(
            client,
            Arc::clone(&self.store),
            Arc::clone(&status),
            self.config.base_url.clone(),
            self.config.locale.clone(),
        ));

        let pool = WorkerPool::start(executor, self.options.workers, Arc::clone(&status));
        let reporter = self
            .options
            .status_interval
            .map(|interval| status::spawn_reporter(Arc::clone(&status), interval));

        for definition in collections {
            self.enqueue(&pool, definition).await;
        }

        let summary = pool.drain().await;

        if let Some(reporter) = reporter {
            reporter.abort();
        }

        for definition in collections {
            if let Err(e) = self.store.record_sync(&definition.id).await {
                log::warn!("Failed to record sync metadata for {}: {e}", definition.id);
            }
        }

        if let Some(url) = &self.config.reindex_url {
            let ids: Vec<String> = collections.iter().map(|c| c.id.clone()).collect();
            if let Err(e) = reindex::trigger(&self.http, url, &ids, &summary).await {
                log::error!("Search reindex failed: {e}");
            }
        }

        let elapsed = start.elapsed();
        let message = format!(
            "{} task(s): {} persisted ({} documents), {} skipped, {} failed in {:.1}s",
            summary.completed,
            summary.persisted,
            summary.documents,
            summary.skipped,
            summary.failed,
            elapsed.as_secs_f64()
        );
        status.progress().finish(message.clone());
        log::info!("Ingest complete: {message}");

        summary
    }

    async fn enqueue(&self, pool: &WorkerPool<Task>, definition: &CollectionDefinition) {
        let collection = Arc::new(definition.clone());

        match definition.kind {
            CollectionKind::Collection => {
                log::info!("{}: queueing listing request", definition.id);
                pool.push(Task::Listing { collection });
            }
            CollectionKind::Data { .. } => {
                let plan = match resume::plan(
                    self.store.as_ref(),
                    definition,
                    self.options.force,
                    self.options.gap_policy,
                )
                .await
                {
                    Ok(Some(plan)) => plan,
                    Ok(None) => return,
                    Err(e) => {
                        log::error!("{}: failed to plan resume, skipping: {e}", definition.id);
                        return;
                    }
                };

                if plan.is_empty() {
                    return;
                }

                let count = pool.extend(plan.ids().map(|id| Task::Item {
                    collection: Arc::clone(&collection),
                    id,
                }));
                log::debug!("{}: queued {count} task(s)", definition.id);
            }
        }
    }
}
