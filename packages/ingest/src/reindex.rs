//! Post-run notification of the search indexer.

use std::time::Duration;

use armory_api::ApiError;
use armory_api::retry::{MAX_RETRIES, send_with_retry};
use armory_ingest_models::PoolSummary;

/// POSTs the run summary to `url`, retrying transient failures.
///
/// # Errors
///
/// Returns [`ApiError`] if the endpoint cannot be reached after retries or
/// rejects the request.
pub async fn trigger(
    http: &reqwest::Client,
    url: &str,
    collections: &[String],
    summary: &PoolSummary,
) -> Result<(), ApiError> {
    let payload = serde_json::json!({
        "collections": collections,
        "summary": summary,
    });

    log::info!("Requesting search reindex at {url}");
    let response = send_with_retry(
        &|| http.post(url).json(&payload),
        MAX_RETRIES,
        Duration::from_secs(1),
    )
    .await?;
    log::info!("Reindex accepted (HTTP {})", response.status());

    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn posts_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reindex"))
            .and(body_partial_json(serde_json::json!({
                "collections": ["items"],
                "summary": {"persisted": 2}
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let summary = PoolSummary {
            completed: 3,
            persisted: 2,
            documents: 2,
            skipped: 1,
            ..PoolSummary::default()
        };
        trigger(
            &reqwest::Client::new(),
            &format!("{}/reindex", server.uri()),
            &["items".to_string()],
            &summary,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = trigger(
            &reqwest::Client::new(),
            &server.uri(),
            &[],
            &PoolSummary::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
