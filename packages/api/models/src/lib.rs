#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Credential and quota telemetry types shared by the API client and the
//! ingest pipeline.
//!
//! The remote API reports two quota windows on every response: a
//! per-second request rate (`x-plan-qps-*`) and an absolute plan quota
//! (`x-plan-quota-*`). [`QuotaSnapshot`] captures both pairs.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Header carrying the current request-rate counter.
pub const RATE_CURRENT_HEADER: &str = "x-plan-qps-current";
/// Header carrying the allotted request-rate ceiling.
pub const RATE_ALLOTTED_HEADER: &str = "x-plan-qps-allotted";
/// Header carrying the current total-quota counter.
pub const TOTAL_CURRENT_HEADER: &str = "x-plan-quota-current";
/// Header carrying the allotted total-quota ceiling.
pub const TOTAL_ALLOTTED_HEADER: &str = "x-plan-quota-allotted";

/// How a credential is presented to the API.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CredentialKind {
    /// Sent as the `apikey` query parameter.
    ApiKey,
    /// Sent as an `Authorization: Bearer` header.
    Bearer,
}

/// A single API credential.
///
/// The secret is never printed in full by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    kind: CredentialKind,
    secret: String,
}

impl Credential {
    /// Creates an API-key credential.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::ApiKey,
            secret: key.into(),
        }
    }

    /// Creates a bearer-token credential.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Bearer,
            secret: token.into(),
        }
    }

    /// How this credential is attached to a request.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// The raw secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// A short, log-safe form of the secret (first four characters).
    #[must_use]
    pub fn masked(&self) -> String {
        let prefix: String = self.secret.chars().take(4).collect();
        format!("{prefix}****")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("secret", &self.masked())
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.masked())
    }
}

/// Quota counters reported by a single API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Requests counted against the current rate window.
    pub rate_current: u64,
    /// Requests allowed per rate window.
    pub rate_max: u64,
    /// Requests counted against the plan quota.
    pub total_current: u64,
    /// Requests allowed by the plan quota.
    pub total_max: u64,
}

impl QuotaSnapshot {
    /// Builds a snapshot from response headers.
    ///
    /// `header` looks up a header value by lowercase name. Returns `None`
    /// unless all four counters are present and parse as integers.
    pub fn from_headers<'a, F>(header: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let read = |name: &str| header(name).and_then(|v| v.trim().parse::<u64>().ok());

        Some(Self {
            rate_current: read(RATE_CURRENT_HEADER)?,
            rate_max: read(RATE_ALLOTTED_HEADER)?,
            total_current: read(TOTAL_CURRENT_HEADER)?,
            total_max: read(TOTAL_ALLOTTED_HEADER)?,
        })
    }
}
