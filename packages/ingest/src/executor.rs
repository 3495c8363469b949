//! Fetch-and-persist execution of a single [`Task`].

use std::sync::Arc;

use armory_api::client::FetchClient;
use armory_database::DocumentStore;
use armory_ingest_models::TaskOutcome;
use async_trait::async_trait;

use crate::pool::TaskExecutor;
use crate::status::IngestStatus;
use crate::task::Task;

/// Runs tasks against the remote API and writes the results to a store.
pub struct IngestExecutor {
    client: FetchClient,
    store: Arc<dyn DocumentStore>,
    status: Arc<IngestStatus>,
    base_url: String,
    locale: String,
}

impl IngestExecutor {
    /// Creates an executor requesting `base_url` with `locale`.
    #[must_use]
    pub fn new(
        client: FetchClient,
        store: Arc<dyn DocumentStore>,
        status: Arc<IngestStatus>,
        base_url: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            status,
            base_url: base_url.into(),
            locale: locale.into(),
        }
    }

    async fn persist(&self, task: &Task, body: serde_json::Value) -> TaskOutcome {
        let collection = task.collection();

        let records = match collection.shape(body) {
            Ok(records) => records,
            Err(e) => {
                log::info!("invalid {task}: {e}");
                return TaskOutcome::Skipped;
            }
        };

        let mut documents = 0u64;
        for record in &records {
            if let Err(e) = self
                .store
                .upsert(&collection.id, &collection.natural_key, record)
                .await
            {
                log::error!("Failed to persist {task}: {e}");
                return TaskOutcome::Failed;
            }
            documents += 1;
        }

        if let Some(id) = task.id() {
            self.status.record_persisted(id);
        }
        log::debug!("stored {task} ({documents} document(s))");

        TaskOutcome::Persisted { documents }
    }
}

#[async_trait]
impl TaskExecutor<Task> for IngestExecutor {
    async fn execute(&self, task: Task) -> TaskOutcome {
        if let Some(id) = task.id() {
            self.status.set_current(id);
        }

        let url = task.url(&self.base_url, &self.locale);

        match self.client.fetch(&url).await {
            Ok(body) => self.persist(&task, body).await,
            Err(e) if e.is_invalid_record() => {
                log::info!("invalid {task}: {e}");
                TaskOutcome::Skipped
            }
            Err(e) => {
                log::warn!("Failed to fetch {task}: {e}");
                TaskOutcome::Failed
            }
        }
    }
}
