use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::PageFetcher;
use super::http::looks_like_challenge;
use crate::config::Config;
use crate::error::{AppError, Result};

/// Renders pages in a shared headless Chromium. The browser is launched on
/// first use; open tabs are capped by a semaphore.
pub struct BrowserFetcher {
    browser: Mutex<Option<Arc<Browser>>>,
    pages: Semaphore,
    user_agent: String,
    chrome_path: Option<PathBuf>,
    settle: Duration,
    render_timeout: Duration,
}

/// Time left for the browser once the HTTP fetcher has used its share of
/// an attempt. Never zero.
fn render_budget(config: &Config) -> Duration {
    let budget = config.attempt_timeout.saturating_sub(config.http_timeout);
    if budget.is_zero() {
        config.attempt_timeout.max(Duration::from_secs(1))
    } else {
        budget
    }
}

/// Owns an open tab and closes it when dropped, so a render cancelled by
/// the attempt deadline still gives the tab back.
struct TabGuard<T: Send + 'static> {
    tab: Option<T>,
    close: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> TabGuard<T> {
    fn new(tab: T, close: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            tab: Some(tab),
            close,
        }
    }

    async fn finish(mut self) {
        if let Some(tab) = self.tab.take() {
            (self.close)(tab).await;
        }
    }
}

impl<T: Send + 'static> Drop for TabGuard<T> {
    fn drop(&mut self) {
        let Some(tab) = self.tab.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn((self.close)(tab));
            }
            Err(_) => warn!("no runtime to close abandoned tab"),
        }
    }
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close error");
        }
    })
}

impl BrowserFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            browser: Mutex::new(None),
            pages: Semaphore::new(config.browser_max_pages),
            user_agent: config.user_agent.clone(),
            chrome_path: config.chrome_path.clone(),
            settle: config.browser_wait,
            render_timeout: render_budget(config),
        }
    }

    async fn get_or_launch(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock().await;
        if let Some(ref browser) = *guard {
            return Ok(Arc::clone(browser));
        }

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| AppError::BrowserError(format!("browser config error: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::BrowserError(format!("browser launch failed: {}", e)))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });
        info!("headless browser launched");

        let shared = Arc::new(browser);
        *guard = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Forgets the cached browser so the next fetch relaunches it.
    async fn reset(&self) {
        self.browser.lock().await.take();
    }

    /// Opens a blank tab, navigates it and returns the rendered HTML, all
    /// within `render_timeout`.
    async fn render(&self, browser: &Browser, url: &str) -> Result<String> {
        match tokio::time::timeout(self.render_timeout, self.open_and_read(browser, url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Timeout),
        }
    }

    async fn open_and_read(&self, browser: &Browser, url: &str) -> Result<String> {
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                self.reset().await;
                return Err(AppError::BrowserError(format!("failed to open page: {}", e)));
            }
        };
        let tab = TabGuard::new(page.clone(), close_page);
        let outcome = self.read(&page, url).await;
        tab.finish().await;
        outcome
    }

    async fn read(&self, page: &Page, url: &str) -> Result<String> {
        page.goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("navigation failed: {}", e)))?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        page.content()
            .await
            .map_err(|e| AppError::BrowserError(format!("failed to read content: {}", e)))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let _permit = self
            .pages
            .acquire()
            .await
            .map_err(|_| AppError::BrowserError("page pool closed".to_string()))?;

        let browser = self.get_or_launch().await?;
        let html = self.render(&browser, url).await?;
        if looks_like_challenge(&html) {
            return Err(AppError::Blocked(url.to_string()));
        }
        Ok(html)
    }

    async fn shutdown(&self) {
        let Some(browser) = self.browser.lock().await.take() else {
            return;
        };
        match Arc::try_unwrap(browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    warn!(error = %e, "browser close error");
                }
            }
            Err(_) => warn!("browser still in use at shutdown"),
        }
    }
}
