//! Environment configuration.

use armory_api::Credential;
use armory_api::oauth::{self, DEFAULT_TOKEN_URL};

use crate::IngestError;

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://us.api.battle.net";

/// Default response locale.
pub const DEFAULT_LOCALE: &str = "en_US";

/// Connection settings read from `ARMORY_*` environment variables.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API host, without a trailing path.
    pub base_url: String,
    /// Locale requested for every record.
    pub locale: String,
    /// Static API keys, in rotation order.
    pub api_keys: Vec<String>,
    /// OAuth client id/secret pairs, in rotation order.
    pub oauth_clients: Vec<(String, String)>,
    /// OAuth token endpoint.
    pub token_url: String,
    /// Endpoint notified after a successful run.
    pub reindex_url: Option<String>,
}

impl IngestConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the OAuth id and secret lists
    /// have different lengths.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the OAuth id and secret lists
    /// have different lengths.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let client_ids = split_list(get("ARMORY_CLIENT_ID").as_deref());
        let client_secrets = split_list(get("ARMORY_CLIENT_SECRET").as_deref());
        if client_ids.len() != client_secrets.len() {
            return Err(IngestError::Config {
                message: format!(
                    "ARMORY_CLIENT_ID has {} entries but ARMORY_CLIENT_SECRET has {}",
                    client_ids.len(),
                    client_secrets.len()
                ),
            });
        }

        Ok(Self {
            base_url: get("ARMORY_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            locale: get("ARMORY_LOCALE").unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            api_keys: split_list(get("ARMORY_API_KEYS").as_deref()),
            oauth_clients: client_ids.into_iter().zip(client_secrets).collect(),
            token_url: get("ARMORY_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            reindex_url: get("ARMORY_REINDEX_URL"),
        })
    }

    /// Builds the credential set: static API keys first, then one bearer
    /// token per OAuth client.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if no credentials are configured, or
    /// [`IngestError::Api`] if a token exchange fails.
    pub async fn credentials(&self, http: &reqwest::Client) -> Result<Vec<Credential>, IngestError> {
        let mut credentials: Vec<Credential> =
            self.api_keys.iter().map(Credential::api_key).collect();

        if !self.oauth_clients.is_empty() {
            log::info!(
                "Exchanging {} OAuth client(s) at {}",
                self.oauth_clients.len(),
                self.token_url
            );
            credentials.extend(oauth::exchange_all(http, &self.token_url, &self.oauth_clients).await?);
        }

        if credentials.is_empty() {
            return Err(IngestError::Config {
                message: "no credentials: set ARMORY_API_KEYS or ARMORY_CLIENT_ID/ARMORY_CLIENT_SECRET"
                    .to_string(),
            });
        }

        log::info!(
            "Using {} credential(s): {}",
            credentials.len(),
            credentials
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(credentials)
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
