//! Authenticated GET under quota supervision.
//!
//! Order of operations for one fetch: wait for the global pause window,
//! lease a credential, send, retry on HTTP 429, hand quota headers to the
//! coordinator (which may pause or rotate), check the status, decode.

use std::sync::Arc;
use std::time::Duration;

use armory_api_models::{Credential, CredentialKind, QuotaSnapshot};
use reqwest::{RequestBuilder, StatusCode};

use crate::FetchError;
use crate::coordinator::QuotaCoordinator;

/// Fixed wait between retries of a hard-throttled (429) request.
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(1);

/// Query parameter used for API-key credentials.
pub const API_KEY_PARAM: &str = "apikey";

/// HTTP client bound to a shared [`QuotaCoordinator`].
///
/// Cheap to clone; clones share the connection pool and the coordinator.
#[derive(Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    coordinator: Arc<QuotaCoordinator>,
    throttle_delay: Duration,
    max_throttle_attempts: Option<u32>,
}

impl FetchClient {
    /// Creates a client with a 1-second throttle delay and unbounded 429
    /// retries.
    #[must_use]
    pub fn new(http: reqwest::Client, coordinator: Arc<QuotaCoordinator>) -> Self {
        Self {
            http,
            coordinator,
            throttle_delay: DEFAULT_THROTTLE_DELAY,
            max_throttle_attempts: None,
        }
    }

    /// Overrides the wait between 429 retries.
    #[must_use]
    pub fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Caps the number of requests sent for one fetch while throttled.
    /// `None` retries forever.
    #[must_use]
    pub fn with_max_throttle_attempts(mut self, max: Option<u32>) -> Self {
        self.max_throttle_attempts = max;
        self
    }

    /// The shared coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<QuotaCoordinator> {
        &self.coordinator
    }

    /// Fetches `url` and decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// * [`FetchError::Throttled`] if 429s outlast the attempt ceiling
    /// * [`FetchError::Invalid`] for any other non-200 status
    /// * [`FetchError::Transport`] if the request could not be completed
    /// * [`FetchError::Decode`] if a 200 body is not JSON
    pub async fn fetch(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        self.coordinator.wait_for_window().await;
        let lease = self.coordinator.lease();

        let mut attempts = 0u32;
        let response = loop {
            attempts += 1;
            let response = authorize(self.http.get(url), &lease.credential)
                .send()
                .await
                .map_err(reqwest::Error::without_url)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                break response;
            }

            if self.max_throttle_attempts.is_some_and(|max| attempts >= max) {
                return Err(FetchError::Throttled {
                    attempts,
                    url: url.to_string(),
                });
            }

            log::warn!(
                "HTTP 429 for {url} (attempt {attempts}), retrying in {:?}",
                self.throttle_delay
            );
            tokio::time::sleep(self.throttle_delay).await;
        };

        let status = response.status();
        let snapshot = QuotaSnapshot::from_headers(|name| {
            response.headers().get(name).and_then(|v| v.to_str().ok())
        });

        if let Some(snapshot) = snapshot {
            log::trace!(
                "quota rate {}/{} total {}/{}",
                snapshot.rate_current,
                snapshot.rate_max,
                snapshot.total_current,
                snapshot.total_max,
            );
            let action = self.coordinator.observe(&lease, snapshot);
            if action.pause().is_some() {
                self.coordinator.wait_for_window().await;
            }
        }

        if status != StatusCode::OK {
            return Err(FetchError::Invalid {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;

        serde_json::from_str(&text).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Attaches `credential` to `request` in the form the API expects.
#[must_use]
pub fn authorize(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
    match credential.kind() {
        CredentialKind::ApiKey => request.query(&[(API_KEY_PARAM, credential.secret())]),
        CredentialKind::Bearer => request.bearer_auth(credential.secret()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chrono::{TimeZone as _, Utc};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::CredentialRotator;
    use crate::governor::RateGovernor;

    fn client(keys: &[&str]) -> FetchClient {
        let credentials = keys.iter().map(|k| Credential::api_key(*k)).collect();
        let coordinator = QuotaCoordinator::new(
            CredentialRotator::new(credentials).unwrap(),
            RateGovernor::default(),
        );
        FetchClient::new(reqwest::Client::new(), Arc::new(coordinator))
    }

    #[tokio::test]
    async fn decodes_json_body_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wow/item/19019"))
            .and(query_param("apikey", "alpha"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 19019, "name": "Thunderfury"})),
            )
            .mount(&server)
            .await;

        let client = client(&["alpha"]);
        let body = client
            .fetch(&format!("{}/wow/item/19019", server.uri()))
            .await
            .unwrap();
        assert_eq!(body["name"], "Thunderfury");
    }

    #[tokio::test]
    async fn bearer_credentials_use_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .mount(&server)
            .await;

        let coordinator = QuotaCoordinator::new(
            CredentialRotator::new(vec![Credential::bearer("tok")]).unwrap(),
            RateGovernor::default(),
        );
        let client = FetchClient::new(reqwest::Client::new(), Arc::new(coordinator));
        let body = client.fetch(&format!("{}/x", server.uri())).await.unwrap();
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn not_found_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&["alpha"])
            .fetch(&format!("{}/wow/item/42", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Invalid { status: 404, .. }));
        assert!(err.is_invalid_record());
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client(&["alpha"])
            .fetch(&format!("{}/x", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn bounded_throttle_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&["alpha"])
            .with_throttle_delay(Duration::from_millis(5))
            .with_max_throttle_attempts(Some(3))
            .fetch(&format!("{}/x", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Throttled { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn quota_headers_reach_coordinator() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("x-plan-qps-current", "1")
                    .insert_header("x-plan-qps-allotted", "100")
                    .insert_header("x-plan-quota-current", "999")
                    .insert_header("x-plan-quota-allotted", "1000"),
            )
            .mount(&server)
            .await;

        let client = client(&["alpha", "beta"]);
        let _ = client.fetch(&format!("{}/x", server.uri())).await;
        assert_eq!(client.coordinator().active_index(), 1);
        assert_eq!(
            client.coordinator().latest_quota().map(|q| q.total_current),
            Some(999)
        );
    }

    /// A coordinator whose clock always reads one second before a minute
    /// boundary, so a saturated window pauses for exactly one second.
    fn client_near_minute_boundary() -> FetchClient {
        let coordinator = QuotaCoordinator::new(
            CredentialRotator::new(vec![Credential::api_key("alpha")]).unwrap(),
            RateGovernor::default(),
        )
        .with_clock(|| Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 59).unwrap());
        FetchClient::new(reqwest::Client::new(), Arc::new(coordinator))
    }

    async fn mount_saturated(server: &MockServer, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1}))
                    .insert_header("x-plan-qps-current", "100")
                    .insert_header("x-plan-qps-allotted", "100")
                    .insert_header("x-plan-quota-current", "10")
                    .insert_header("x-plan-quota-allotted", "1000"),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn saturated_window_delays_the_next_request() {
        let server = MockServer::start().await;
        mount_saturated(&server, "/wow/item/1").await;
        Mock::given(method("GET"))
            .and(path("/wow/item/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 2})))
            .mount(&server)
            .await;

        let client = client_near_minute_boundary();
        let start = Instant::now();
        client
            .fetch(&format!("{}/wow/item/1", server.uri()))
            .await
            .unwrap();
        client
            .fetch(&format!("{}/wow/item/2", server.uri()))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pause_holds_requests_from_other_workers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wow/item/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 2})))
            .mount(&server)
            .await;

        let client = client_near_minute_boundary();
        let coordinator = Arc::clone(client.coordinator());
        coordinator.observe(
            &coordinator.lease(),
            QuotaSnapshot {
                rate_current: 100,
                rate_max: 100,
                total_current: 10,
                total_max: 1000,
            },
        );

        let start = Instant::now();
        let pending = tokio::spawn({
            let client = client.clone();
            let url = format!("{}/wow/item/2", server.uri());
            async move { client.fetch(&url).await }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(server.received_requests().await.unwrap().is_empty());

        pending.await.unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let err = client(&["alpha"])
            .fetch("http://127.0.0.1:9/unreachable")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
