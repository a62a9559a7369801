pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod sites;

use std::sync::Arc;

use config::Config;
use error::Result;
use fetch::FetchChain;
use registry::EndpointStore;
use retry::RetryPolicy;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chain: Arc<FetchChain>,
    pub policy: RetryPolicy,
    pub store: Arc<EndpointStore>,
}

impl AppState {
    pub fn new(config: Config, chain: FetchChain) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config),
            store: Arc::new(EndpointStore::new(config.registry_dir.clone())),
            chain: Arc::new(chain),
            config: Arc::new(config),
        }
    }

    /// Builds the production fetch chain from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let chain = FetchChain::from_config(&config)?;
        Ok(Self::new(config, chain))
    }
}
