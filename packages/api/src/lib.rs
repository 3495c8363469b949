#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Rate-governed client for the game data API.
//!
//! Every request goes through a shared [`coordinator::QuotaCoordinator`],
//! which owns the active credential and the latest quota telemetry. The
//! [`client::FetchClient`] retries hard throttles (HTTP 429) locally and
//! forwards quota headers to the [`governor::RateGovernor`], which decides
//! whether the pipeline pauses until the next quota window or rotates to
//! the next credential.

pub mod client;
pub mod coordinator;
pub mod credentials;
pub mod governor;
pub mod oauth;
pub mod progress;
pub mod retry;

pub use armory_api_models::{Credential, CredentialKind, QuotaSnapshot};

/// Errors raised while setting up API access.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The credential set is empty.
    #[error("No API credentials configured")]
    NoCredentials,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The OAuth token endpoint rejected or garbled the exchange.
    #[error("Token exchange failed: {message}")]
    Token {
        /// Description of what went wrong.
        message: String,
    },

    /// Request failed after all retries.
    #[error("Request failed: {message}")]
    Request {
        /// Description of what went wrong.
        message: String,
    },
}

/// Errors raised by a single [`client::FetchClient::fetch`] call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP 429 persisted past the configured attempt ceiling.
    #[error("Throttled (HTTP 429) after {attempts} attempts: {url}")]
    Throttled {
        /// Number of requests sent.
        attempts: u32,
        /// Request URL.
        url: String,
    },

    /// Any non-200, non-429 status. The record does not exist or cannot be
    /// served.
    #[error("Invalid response HTTP {status}: {url}")]
    Invalid {
        /// Response status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// DNS, connection, timeout or body-read failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The 200 response body was not valid JSON.
    #[error("Response body is not valid JSON ({url}): {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Parser error.
        message: String,
    },
}

impl FetchError {
    /// Whether the task should simply be skipped (no record exists for it)
    /// rather than counted as a failure.
    #[must_use]
    pub const fn is_invalid_record(&self) -> bool {
        matches!(self, Self::Invalid { .. } | Self::Decode { .. })
    }
}
