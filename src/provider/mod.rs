//! Proxy Providers
//!
//! A provider is a named set of outbound proxies with its own health check.
//! The registry is owned by the tunnel and rebuilt whenever a configuration
//! is applied; the control plane only reads it.

mod healthcheck;
mod proxy;

pub use healthcheck::{HealthCheck, PROBE_TIMEOUT};
pub use proxy::{FileProvider, InlineProvider};

use crate::config::ProviderConfig;
use crate::outbound::Proxy;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Vehicle type (how data is loaded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleType {
    File,
    Inline,
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleType::File => write!(f, "File"),
            VehicleType::Inline => write!(f, "Inline"),
        }
    }
}

/// Trait for proxy providers
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Vehicle type (how proxies are loaded)
    fn vehicle_type(&self) -> VehicleType;

    /// Get proxies
    fn proxies(&self) -> Vec<Arc<Proxy>>;

    /// Get health check URL
    fn health_check_url(&self) -> &str;

    /// Last load time
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Initial load; starts the periodic health check when configured
    async fn initial(&self) -> Result<()>;

    /// Health check all proxies
    async fn health_check(&self);

    /// Close provider
    async fn close(&self);
}

/// Build a provider from its configuration entry
pub fn build_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn ProxyProvider>> {
    config.validate()?;

    let hc = &config.health_check;
    let interval = if hc.enable {
        Duration::from_secs(hc.interval)
    } else {
        Duration::ZERO
    };
    let health_check = HealthCheck::new(hc.url.clone(), interval, hc.lazy);

    match config.provider_type.to_lowercase().as_str() {
        "file" => {
            let path = config.path.clone().unwrap_or_default();
            Ok(Arc::new(FileProvider::new(
                name.to_string(),
                PathBuf::from(path),
                health_check,
            )))
        }
        "inline" => {
            let proxies = config
                .payload
                .iter()
                .map(|p| Proxy::from_config(p).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(InlineProvider::new(
                name.to_string(),
                proxies,
                health_check,
            )))
        }
        other => Err(Error::provider(format!("Unsupported provider type: {}", other))),
    }
}

/// Provider registry keyed by name
pub struct ProviderManager {
    proxy_providers: RwLock<HashMap<String, Arc<dyn ProxyProvider>>>,
}

impl ProviderManager {
    /// Create new provider manager
    pub fn new() -> Self {
        ProviderManager {
            proxy_providers: RwLock::new(HashMap::new()),
        }
    }

    /// Add proxy provider
    pub fn add_proxy_provider(&self, provider: Arc<dyn ProxyProvider>) {
        let name = provider.name().to_string();
        self.proxy_providers.write().insert(name, provider);
    }

    /// Get proxy provider by name
    pub fn get_proxy_provider(&self, name: &str) -> Option<Arc<dyn ProxyProvider>> {
        self.proxy_providers.read().get(name).cloned()
    }

    /// Snapshot of all proxy providers
    pub fn proxy_providers(&self) -> HashMap<String, Arc<dyn ProxyProvider>> {
        self.proxy_providers.read().clone()
    }

    /// Swap in a new provider set, returning the previous one
    pub fn replace(
        &self,
        providers: HashMap<String, Arc<dyn ProxyProvider>>,
    ) -> HashMap<String, Arc<dyn ProxyProvider>> {
        std::mem::replace(&mut *self.proxy_providers.write(), providers)
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}
