use super::{PageRenderer, RenderOptions, RenderedPage};
use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
enum HttpError {
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl HttpError {
    /// Rate limiting, server trouble and network hiccups are worth a retry.
    fn is_transient(&self) -> bool {
        match self {
            HttpError::Status(s) => *s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
            HttpError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        }
    }
}

/// Static-fetch renderer. Sees the offers the server embeds in its first
/// response; anything loaded on scroll is out of reach.
pub struct HttpRenderer {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpRenderer {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            // Accept cookies so consent/session redirects settle
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text with rate-limiting and retry.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1) / 2 + 1)
            .max_delay(Duration::from_secs(60))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(
            strategy,
            || self.fetch_once(url, timeout),
            |e: &HttpError| {
                let retry = e.is_transient();
                if retry {
                    warn!("GET {} failed ({}), retrying", url, e);
                }
                retry
            },
        )
        .await
        .with_context(|| format!("All retries exhausted for {}", url))
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<String, HttpError> {
        debug!("GET {}", url);
        let resp = self.inner.get(url).timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HttpError::Status(status));
        }
        Ok(resp.text().await?)
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        sleep(Duration::from_millis(self.config.request_delay_ms + jitter_ms)).await;
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn open(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage> {
        if options.scroll_passes > 0 {
            trace!("static fetch of {}, {} scroll passes skipped", url, options.scroll_passes);
        }
        let html = self.get_text(url, options.timeout).await?;
        Ok(RenderedPage::new(url, html))
    }
}
