//! Configuration module
//!
//! Parses and validates the engine configuration. This is the loader behind
//! `PUT /configs`: inline payloads go through [`Config::from_bytes`], file
//! references through [`Config::load`].

use crate::log::LogLevel;
use crate::tunnel::TunnelMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// HTTP proxy port (0 disables the listener)
    pub port: u16,

    /// SOCKS5 proxy port
    pub socks_port: u16,

    /// Redirect (transparent proxy) port
    pub redir_port: u16,

    /// Allow LAN access
    pub allow_lan: bool,

    /// Bind address used when LAN access is allowed ("*" for all interfaces)
    pub bind_address: String,

    /// Mode (rule, global, direct)
    pub mode: TunnelMode,

    /// Log level
    pub log_level: LogLevel,

    /// External controller address
    pub external_controller: Option<String>,

    /// External controller via Unix Socket
    pub external_controller_unix: Option<String>,

    /// Proxy providers keyed by name
    pub proxy_providers: HashMap<String, ProviderConfig>,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&content)
    }

    /// Parse from raw bytes
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::config("Configuration is empty"));
        }
        let config: Config = serde_yaml::from_slice(buf)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from string
    pub fn from_str(content: &str) -> Result<Self> {
        Self::from_bytes(content.as_bytes())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.is_empty() {
            return Err(Error::config("bind-address cannot be empty"));
        }

        for (name, provider) in &self.proxy_providers {
            if name.is_empty() {
                return Err(Error::config("Provider name cannot be empty"));
            }
            provider
                .validate()
                .map_err(|e| Error::config(format!("proxy provider {}: {}", name, e)))?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 0,
            socks_port: 0,
            redir_port: 0,
            allow_lan: false,
            bind_address: "*".to_string(),
            mode: TunnelMode::Rule,
            log_level: LogLevel::Info,
            external_controller: None,
            external_controller_unix: None,
            proxy_providers: HashMap::new(),
        }
    }
}

/// Proxy provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProviderConfig {
    /// Vehicle type (file, inline)
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Path to a YAML file with a `proxies` list (file vehicle)
    #[serde(default)]
    pub path: Option<String>,

    /// Proxies defined in place (inline vehicle)
    #[serde(default)]
    pub payload: Vec<ProxyConfig>,

    /// Health check settings
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<()> {
        match self.provider_type.to_lowercase().as_str() {
            "file" => {
                if self.path.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::config("file provider requires a path"));
                }
            }
            "inline" => {
                for proxy in &self.payload {
                    proxy.validate()?;
                }
            }
            other => {
                return Err(Error::config(format!("Unsupported provider type: {}", other)));
            }
        }

        if self.health_check.enable && self.health_check.url.is_empty() {
            return Err(Error::config("health check requires a url"));
        }

        Ok(())
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run periodic checks
    pub enable: bool,

    /// URL reported as the provider's test URL
    pub url: String,

    /// Interval in seconds
    pub interval: u64,

    /// Skip periodic checks while the provider is not in use
    pub lazy: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            enable: false,
            url: "http://www.gstatic.com/generate_204".to_string(),
            interval: 300,
            lazy: true,
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy name
    pub name: String,

    /// Proxy type
    #[serde(rename = "type")]
    pub proxy_type: String,

    /// Server address
    pub server: String,

    /// Server port
    pub port: u16,

    /// All other fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("Proxy name cannot be empty"));
        }
        if self.server.is_empty() {
            return Err(Error::config("Proxy server cannot be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("Proxy port cannot be 0"));
        }
        Ok(())
    }
}

/// Contents of a file-vehicle provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyList {
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,
}

impl ProxyList {
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let list: ProxyList = serde_yaml::from_slice(buf)?;
        for proxy in &list.proxies {
            proxy.validate()?;
        }
        Ok(list)
    }
}
