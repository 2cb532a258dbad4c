//! Write-only sink that forwards flushed batches to an HTTP endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;
use crate::storage::AuditStorage;

/// Request timeout unless overridden with [`WebhookAuditStorage::with_timeout`]
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// POSTs each flushed batch as a JSON array of records
///
/// There is no read path, so `query_records` and `count_records` report
/// [`AuditError::Unsupported`]. Nothing is retried.
pub struct WebhookAuditStorage {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookAuditStorage {
    pub fn new(url: impl Into<String>) -> AuditResult<Self> {
        Self::with_timeout(url, Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> AuditResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AuditError::backend)?;

        Ok(Self {
            client,
            url: url.into(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every batch
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuditStorage for WebhookAuditStorage {
    type Transaction = ();

    async fn write(&self, records: Vec<AuditRecord>, _trx: Option<&()>) -> AuditResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut request = self.client.post(&self.url).json(&records);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(AuditError::backend)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %self.url, status = status.as_u16(), "Audit webhook rejected batch");
            return Err(AuditError::Sink {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %self.url, count = records.len(), "Delivered audit batch to webhook");
        Ok(())
    }
}

impl std::fmt::Debug for WebhookAuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuditStorage")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
