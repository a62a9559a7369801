//! Page fetchers and the fallback chain that strings them together.

pub mod browser;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result};

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the page HTML.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Releases long-lived resources such as a browser process.
    async fn shutdown(&self) {}
}

/// Ordered list of fetchers; later ones are only tried when earlier ones
/// fail to produce a page the extractor accepts.
#[derive(Clone)]
pub struct FetchChain {
    fetchers: Vec<Arc<dyn PageFetcher>>,
}

impl FetchChain {
    pub fn new(fetchers: Vec<Arc<dyn PageFetcher>>) -> Self {
        Self { fetchers }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut fetchers: Vec<Arc<dyn PageFetcher>> = vec![Arc::new(HttpFetcher::new(config)?)];
        if config.browser_fallback {
            fetchers.push(Arc::new(BrowserFetcher::new(config)));
        }
        Ok(Self::new(fetchers))
    }

    /// Runs `extract` on the first page that yields a result. A non-retryable
    /// error stops the chain immediately.
    pub async fn fetch_and_extract<T, F>(&self, url: &str, extract: F) -> Result<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        let mut last_error = None;

        for fetcher in &self.fetchers {
            let outcome = match fetcher.fetch(url).await {
                Ok(html) => {
                    debug!(fetcher = fetcher.name(), url, bytes = html.len(), "page fetched");
                    extract(&html)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(fetcher = fetcher.name(), url, error = %e, "strategy failed, falling back");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::ConfigError("no fetchers configured".to_string())))
    }

    pub async fn shutdown(&self) {
        for fetcher in &self.fetchers {
            debug!(fetcher = fetcher.name(), "shutting down fetcher");
            fetcher.shutdown().await;
        }
    }
}
