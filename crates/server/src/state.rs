//! Application state shared across handlers.

use promhub_core::config::{AppConfig, ProxyEndpoint};
use promhub_registry::RegistryStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Target registry.
    pub registry: Arc<dyn RegistryStore>,
    /// Client used by the proxy for upstream scrapes.
    pub http: reqwest::Client,
    /// Where discovery tells the scraper to find the proxy.
    pub proxy: Arc<ProxyEndpoint>,
}

impl AppState {
    /// Create new application state.
    ///
    /// Fails if the proxy address cannot be parsed or the HTTP client cannot
    /// be built.
    pub fn new(config: AppConfig, registry: Arc<dyn RegistryStore>) -> anyhow::Result<Self> {
        let proxy = config.proxy.endpoint()?;
        let http = reqwest::Client::builder()
            .timeout(config.proxy.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            http,
            proxy: Arc::new(proxy),
        })
    }
}
