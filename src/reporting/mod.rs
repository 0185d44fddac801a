//! Client for the security reporting API.
//!
//! Each public query validates its own parameters before touching the
//! network. Validation failures and empty result sets come back as
//! [`Reply`] values so the chat model can relay them; transport and
//! remote failures are returned as [`ReportingError`] and left to the
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ReportingConfig;

pub mod activity;
pub mod categories;
pub mod credentials;
pub mod deployments;
pub mod destinations;
pub mod identity;
pub mod params;
pub mod threats;

#[cfg(test)]
pub(crate) mod mock;

use credentials::{CredentialSource, TokenCache};

pub const NO_DATA_MESSAGE: &str = "No data found for current date range";

#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    #[error("reporting request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reporting API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected reporting response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("credential exchange failed: {0}")]
    Credential(String),
}

/// A validation failure the model should relay to the user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Rejection {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

impl Rejection {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), data: None }
    }

    pub fn with_candidates(error: impl Into<String>, candidates: Vec<Value>) -> Self {
        Self { error: error.into(), data: Some(candidates) }
    }
}

/// Outcome of a reporting query that reached a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Data(T),
    /// Nothing matched; carries an informational message, not an error.
    Empty(String),
    Rejected(Rejection),
}

impl<T: Serialize> Reply<T> {
    /// Flattens into output records: lists become one record per item,
    /// everything else a single record.
    pub fn into_outputs(self) -> Result<Vec<Value>, serde_json::Error> {
        let value = match self {
            Reply::Data(data) => serde_json::to_value(data)?,
            Reply::Empty(message) => serde_json::json!({ "message": message }),
            Reply::Rejected(rejection) => serde_json::to_value(rejection)?,
        };
        Ok(match value {
            Value::Array(items) => items,
            other => vec![other],
        })
    }
}

impl<T> From<Rejection> for Reply<T> {
    fn from(rejection: Rejection) -> Self {
        Reply::Rejected(rejection)
    }
}

/// Envelope shared by the report endpoints.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct ReportingClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    tokens: Arc<TokenCache>,
}

impl ReportingClient {
    pub fn new(config: &ReportingConfig, tokens: Arc<TokenCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ReportingError> {
        let url = self.url(path);
        self.send_authorized(|token| self.http.get(&url).query(query).bearer_auth(token)).await
    }

    /// Sends with the cached bearer token. A 401 evicts the token and the
    /// request is retried once with a fresh one.
    async fn send_authorized<T, F>(&self, build: F) -> Result<T, ReportingError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.get_token(self).await?;
        let resp = build(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return decode(resp).await;
        }

        warn!("reporting API rejected cached credential; refreshing");
        self.tokens.invalidate(&token).await;
        let token = self.tokens.get_token(self).await?;
        decode(build(&token).send().await?).await
    }
}

#[async_trait]
impl CredentialSource for ReportingClient {
    /// OAuth2 client-credentials exchange. Only the token string is kept;
    /// expiry is tracked by the cache.
    async fn acquire_credential(&self) -> Result<String, ReportingError> {
        let resp = self
            .http
            .post(self.url("/auth/v2/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportingError::Credential(format!("{status}: {body}")));
        }
        let token: TokenResponse = resp.json().await?;
        debug!("reporting credential issued");
        Ok(token.access_token)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ReportingError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ReportingError::Status { status, body });
    }
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
