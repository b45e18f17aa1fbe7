//! File and inline proxy providers

use super::{HealthCheck, ProxyProvider, VehicleType};
use crate::config::ProxyList;
use crate::outbound::Proxy;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

fn spawn_auto_check(health_check: &Arc<HealthCheck>) {
    if health_check.is_auto() {
        let hc = health_check.clone();
        tokio::spawn(async move {
            hc.start().await;
        });
    }
}

/// Provider loading its proxies from a YAML file on disk
pub struct FileProvider {
    name: String,
    path: PathBuf,
    proxies: RwLock<Vec<Arc<Proxy>>>,
    health_check: Arc<HealthCheck>,
    updated_at: RwLock<Option<DateTime<Utc>>>,
}

impl FileProvider {
    pub fn new(name: String, path: PathBuf, health_check: HealthCheck) -> Self {
        FileProvider {
            name,
            path,
            proxies: RwLock::new(Vec::new()),
            health_check: Arc::new(health_check),
            updated_at: RwLock::new(None),
        }
    }

    async fn load(&self) -> Result<Vec<Arc<Proxy>>> {
        let content = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::provider(format!("{}: failed to read {}: {}", self.name, self.path.display(), e))
        })?;
        let list = ProxyList::from_bytes(&content)
            .map_err(|e| Error::provider(format!("{}: {}", self.name, e)))?;

        list.proxies
            .iter()
            .map(|p| Proxy::from_config(p).map(Arc::new))
            .collect()
    }
}

#[async_trait]
impl ProxyProvider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vehicle_type(&self) -> VehicleType {
        VehicleType::File
    }

    fn proxies(&self) -> Vec<Arc<Proxy>> {
        self.proxies.read().clone()
    }

    fn health_check_url(&self) -> &str {
        self.health_check.url()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        *self.updated_at.read()
    }

    async fn initial(&self) -> Result<()> {
        let proxies = self.load().await?;
        info!("Provider {} loaded {} proxies from {}", self.name, proxies.len(), self.path.display());

        self.health_check.set_proxies(proxies.clone()).await;
        *self.proxies.write() = proxies;
        *self.updated_at.write() = Some(Utc::now());

        spawn_auto_check(&self.health_check);
        Ok(())
    }

    async fn health_check(&self) {
        debug!("Health check provider {}", self.name);
        self.health_check.touch();
        self.health_check.check().await;
    }

    async fn close(&self) {
        self.health_check.close();
    }
}

/// Inline provider (proxies defined directly in config)
pub struct InlineProvider {
    name: String,
    proxies: Vec<Arc<Proxy>>,
    health_check: Arc<HealthCheck>,
    updated_at: DateTime<Utc>,
}

impl InlineProvider {
    pub fn new(name: String, proxies: Vec<Arc<Proxy>>, health_check: HealthCheck) -> Self {
        InlineProvider {
            name,
            proxies,
            health_check: Arc::new(health_check),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ProxyProvider for InlineProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vehicle_type(&self) -> VehicleType {
        VehicleType::Inline
    }

    fn proxies(&self) -> Vec<Arc<Proxy>> {
        self.proxies.clone()
    }

    fn health_check_url(&self) -> &str {
        self.health_check.url()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    async fn initial(&self) -> Result<()> {
        self.health_check.set_proxies(self.proxies.clone()).await;
        spawn_auto_check(&self.health_check);
        Ok(())
    }

    async fn health_check(&self) {
        debug!("Health check provider {}", self.name);
        self.health_check.touch();
        self.health_check.check().await;
    }

    async fn close(&self) {
        self.health_check.close();
    }
}
