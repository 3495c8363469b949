//! OAuth client-credentials exchange.
//!
//! Each configured client id/secret pair is traded for a bearer token once
//! at startup. Tokens are not refreshed; an expired token surfaces as a
//! 401, which the fetch client reports as an invalid response.

use armory_api_models::Credential;
use serde::Deserialize;

use crate::ApiError;
use crate::retry;

/// Default token endpoint for the US region.
pub const DEFAULT_TOKEN_URL: &str = "https://us.battle.net/oauth/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges one client id/secret pair for a bearer credential.
///
/// # Errors
///
/// Returns [`ApiError`] if the token endpoint is unreachable after retries,
/// rejects the client, or returns a body without an `access_token`.
pub async fn exchange_client_credentials(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<Credential, ApiError> {
    let body = retry::send_json(|| {
        http.post(token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
    })
    .await
    .map_err(|e| ApiError::Token {
        message: format!("client {client_id}: {e}"),
    })?;

    let token: TokenResponse = serde_json::from_value(body).map_err(|e| ApiError::Token {
        message: format!("client {client_id}: {e}"),
    })?;

    if token
        .token_type
        .as_deref()
        .is_some_and(|t| !t.eq_ignore_ascii_case("bearer"))
    {
        log::warn!(
            "Token endpoint returned token_type {:?} for client {client_id}, using it as a bearer token",
            token.token_type
        );
    }

    let credential = Credential::bearer(token.access_token);
    match token.expires_in {
        Some(secs) => log::info!(
            "Obtained token {} for client {client_id}, expires in {}h{:02}m (not refreshed)",
            credential.masked(),
            secs / 3600,
            (secs % 3600) / 60,
        ),
        None => log::info!("Obtained token {} for client {client_id}", credential.masked()),
    }

    Ok(credential)
}

/// Exchanges every pair in order. The resulting credentials keep the order
/// of `clients`.
///
/// # Errors
///
/// Returns the first [`ApiError`] encountered.
pub async fn exchange_all(
    http: &reqwest::Client,
    token_url: &str,
    clients: &[(String, String)],
) -> Result<Vec<Credential>, ApiError> {
    let mut credentials = Vec::with_capacity(clients.len());
    for (id, secret) in clients {
        credentials.push(exchange_client_credentials(http, token_url, id, secret).await?);
    }
    Ok(credentials)
}
