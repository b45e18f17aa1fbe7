//! Engine control surface
//!
//! [`EngineControl`] is everything the REST hub may ask of the running
//! engine. Handlers hold it as a trait object so tests can swap in a
//! recording double; [`Engine`] is the in-process implementation.

use crate::config::Config;
use crate::inbound::{ListenerKind, ListenerManager, Ports};
use crate::log::{LogController, LogLevel};
use crate::provider::{build_provider, ProxyProvider};
use crate::tunnel::{Tunnel, TunnelMode};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// General configuration snapshot served by `GET /configs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct General {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: TunnelMode,
    pub log_level: LogLevel,
}

/// Operations the control plane performs against the engine
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Live general configuration
    fn general(&self) -> General;

    fn set_allow_lan(&self, allow: bool);

    fn set_bind_address(&self, address: String);

    /// Current listener ports
    fn ports(&self) -> Ports;

    async fn recreate_http(&self, port: u16) -> Result<()>;

    async fn recreate_socks(&self, port: u16) -> Result<()>;

    async fn recreate_redir(&self, port: u16) -> Result<()>;

    fn set_mode(&self, mode: TunnelMode);

    fn set_log_level(&self, level: LogLevel);

    /// Snapshot of the proxy provider registry
    fn providers(&self) -> HashMap<String, Arc<dyn ProxyProvider>>;

    /// Parse a configuration held in memory
    fn parse_with_bytes(&self, buf: &[u8]) -> Result<Config> {
        Config::from_bytes(buf)
    }

    /// Parse a configuration file
    fn parse_with_path(&self, path: &Path) -> Result<Config> {
        Config::load(path)
    }

    /// Apply a parsed configuration; `force` also re-applies listener settings
    async fn apply_config(&self, config: Config, force: bool);
}

/// In-process engine
pub struct Engine {
    tunnel: Tunnel,
    listeners: ListenerManager,
    log: LogController,
}

impl Engine {
    pub fn new(log: LogController) -> Self {
        Engine {
            tunnel: Tunnel::new(),
            listeners: ListenerManager::new(),
            log,
        }
    }

    pub fn tunnel(&self) -> &Tunnel {
        &self.tunnel
    }

    pub fn listeners(&self) -> &ListenerManager {
        &self.listeners
    }

    /// Stop listeners and providers
    pub async fn shutdown(&self) {
        self.listeners.close_all().await;
        for provider in self.tunnel.providers().replace(HashMap::new()).into_values() {
            provider.close().await;
        }
    }

    async fn update_providers(&self, config: &Config) {
        let mut providers: HashMap<String, Arc<dyn ProxyProvider>> = HashMap::new();

        for (name, provider_config) in &config.proxy_providers {
            let provider = match build_provider(name, provider_config) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping proxy provider {}: {}", name, e);
                    continue;
                }
            };
            if let Err(e) = provider.initial().await {
                warn!("Proxy provider {} initial load failed: {}", name, e);
                continue;
            }
            providers.insert(name.clone(), provider);
        }

        info!("Loaded {} proxy providers", providers.len());
        let previous = self.tunnel.providers().replace(providers);
        for provider in previous.into_values() {
            provider.close().await;
        }
    }

    async fn update_listeners(&self, config: &Config) {
        self.listeners.set_allow_lan(config.allow_lan);
        self.listeners.set_bind_address(config.bind_address.clone());

        let ports = [
            (ListenerKind::Http, config.port),
            (ListenerKind::Socks, config.socks_port),
            (ListenerKind::Redir, config.redir_port),
        ];
        for (kind, port) in ports {
            if let Err(e) = self.listeners.recreate(kind, port).await {
                warn!("Start {} server error: {}", kind, e);
            }
        }
    }
}

#[async_trait]
impl EngineControl for Engine {
    fn general(&self) -> General {
        let ports = self.listeners.ports();
        General {
            port: ports.port,
            socks_port: ports.socks_port,
            redir_port: ports.redir_port,
            allow_lan: self.listeners.allow_lan(),
            bind_address: self.listeners.bind_address(),
            mode: self.tunnel.mode(),
            log_level: self.log.level(),
        }
    }

    fn set_allow_lan(&self, allow: bool) {
        self.listeners.set_allow_lan(allow);
    }

    fn set_bind_address(&self, address: String) {
        self.listeners.set_bind_address(address);
    }

    fn ports(&self) -> Ports {
        self.listeners.ports()
    }

    async fn recreate_http(&self, port: u16) -> Result<()> {
        self.listeners.recreate(ListenerKind::Http, port).await
    }

    async fn recreate_socks(&self, port: u16) -> Result<()> {
        self.listeners.recreate(ListenerKind::Socks, port).await
    }

    async fn recreate_redir(&self, port: u16) -> Result<()> {
        self.listeners.recreate(ListenerKind::Redir, port).await
    }

    fn set_mode(&self, mode: TunnelMode) {
        self.tunnel.set_mode(mode);
    }

    fn set_log_level(&self, level: LogLevel) {
        self.log.set_level(level);
    }

    fn providers(&self) -> HashMap<String, Arc<dyn ProxyProvider>> {
        self.tunnel.providers().proxy_providers()
    }

    async fn apply_config(&self, config: Config, force: bool) {
        self.update_providers(&config).await;

        self.log.set_level(config.log_level);
        self.tunnel.set_mode(config.mode);

        if force {
            self.update_listeners(&config).await;
        }
        info!("Configuration applied (force: {})", force);
    }
}
