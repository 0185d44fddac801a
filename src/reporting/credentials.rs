//! Bearer credential cache for the reporting API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use super::ReportingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Something that can mint a new bearer token.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn acquire_credential(&self) -> Result<String, ReportingError>;
}

/// Holds at most one live credential. The lock is held across a refresh,
/// so concurrent misses wait for a single exchange instead of racing.
pub struct TokenCache {
    ttl: Duration,
    slot: Mutex<Option<Credential>>,
}

impl TokenCache {
    /// `ttl` should be shorter than the remote lifetime of a token.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: Mutex::new(None) }
    }

    pub async fn get_token(&self, source: &dyn CredentialSource) -> Result<String, ReportingError> {
        let mut slot = self.slot.lock().await;
        let now = Utc::now();
        if let Some(cred) = slot.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cred.token.clone());
        }

        let token = source.acquire_credential().await?;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        *slot = Some(Credential { token: token.clone(), expires_at: now + ttl });
        metrics::counter!("assistant_token_refresh_total").increment(1);
        info!(ttl_secs = self.ttl.as_secs(), "reporting credential refreshed");
        Ok(token)
    }

    /// Drops the cached credential if it is still the rejected one. A token
    /// minted by a concurrent refresh is kept.
    pub async fn invalidate(&self, rejected: &str) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|c| c.token == rejected) {
            slot.take();
        }
    }

    #[cfg(test)]
    pub async fn current(&self) -> Option<Credential> {
        self.slot.lock().await.clone()
    }
}
