use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};

use crate::cli::config::FetcherSettings;
use crate::crawler::error::FetchError;
use crate::crawler::model::{CrawlTarget, RawDocument};

/// Source of raw certificate pages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page, retrying transient failures
    async fn fetch(&self, target: &CrawlTarget) -> Result<RawDocument, FetchError>;
}

/// reqwest backed fetcher with a bounded timeout and fixed-interval retries
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    async fn fetch_once(&self, target: &CrawlTarget) -> Result<RawDocument, FetchError> {
        debug!("GET {}", target);

        let response = self.client.get(target.as_str())
            .send()
            .await
            .map_err(|e| {
                warn!("Request to {} failed: {}", target, e);
                FetchError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} returned HTTP {}", target, status.as_u16());
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let content_type = response.headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(FetchError::from)?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        debug!("Fetched {} bytes from {}", body.len(), target);

        Ok(RawDocument {
            url: target.to_string(),
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, target: &CrawlTarget) -> Result<RawDocument, FetchError> {
        let strategy = FixedInterval::new(self.retry_backoff).take(self.max_retries as usize);

        RetryIf::spawn(
            strategy,
            || self.fetch_once(target),
            |error: &FetchError| {
                let retry = error.is_transient();
                if retry {
                    debug!("Retrying {} after transient failure: {}", target, error);
                }
                retry
            },
        )
        .await
    }
}
