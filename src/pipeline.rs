use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::fetch::FetchChain;
use crate::retry::RetryPolicy;
use crate::sites::{Params, Site};

/// Validate, then fetch-and-extract under the retry policy.
pub async fn run(
    site: &dyn Site,
    params: &Params,
    chain: &FetchChain,
    policy: &RetryPolicy,
) -> Result<Value> {
    let target = site.target(params)?;
    let target = target.as_str();
    let started = Instant::now();
    info!(endpoint = site.name(), target, "scraping");

    let result = policy
        .run(move |attempt| async move {
            debug!(endpoint = site.name(), attempt, "attempt started");
            chain
                .fetch_and_extract(target, |html| site.extract(html))
                .await
        })
        .await;

    info!(
        endpoint = site.name(),
        ok = result.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scrape finished"
    );
    result
}
