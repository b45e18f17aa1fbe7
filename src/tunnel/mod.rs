//! Tunnel core - traffic mode and provider registry owned by the routing engine

use crate::provider::ProviderManager;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Tunnel mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum TunnelMode {
    /// Use rules for routing
    #[default]
    Rule,
    /// All traffic to global proxy
    Global,
    /// All traffic direct
    Direct,
}

impl TunnelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelMode::Rule => "rule",
            TunnelMode::Global => "global",
            TunnelMode::Direct => "direct",
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TunnelMode {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(TunnelMode::Rule),
            "global" => Ok(TunnelMode::Global),
            "direct" => Ok(TunnelMode::Direct),
            _ => Err(Error::config(format!("Unknown tunnel mode: {}", s))),
        }
    }
}

impl TryFrom<String> for TunnelMode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        TunnelMode::try_from(s.as_str())
    }
}

impl From<TunnelMode> for &'static str {
    fn from(mode: TunnelMode) -> Self {
        mode.as_str()
    }
}

/// Routing engine state visible to the control plane
pub struct Tunnel {
    mode: RwLock<TunnelMode>,
    providers: ProviderManager,
}

impl Tunnel {
    pub fn new() -> Self {
        Tunnel {
            mode: RwLock::new(TunnelMode::default()),
            providers: ProviderManager::new(),
        }
    }

    /// Set tunnel mode
    pub fn set_mode(&self, mode: TunnelMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            info!("Tunnel mode changed to {}", mode);
        }
    }

    /// Get current mode
    pub fn mode(&self) -> TunnelMode {
        *self.mode.read()
    }

    /// Proxy provider registry
    pub fn providers(&self) -> &ProviderManager {
        &self.providers
    }
}

impl Default for Tunnel {
    fn default() -> Self {
        Self::new()
    }
}
