//! Outbound proxy descriptors
//!
//! The data plane is not part of this crate; an outbound here is the
//! addressable endpoint a provider exposes plus its health-check history.

use crate::config::ProxyConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Number of delay samples kept per proxy
pub const MAX_HISTORY: usize = 10;

/// Proxy type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Shadowsocks,
    Vmess,
    Trojan,
    Hysteria2,
    Http,
    Socks5,
    Vless,
    Snell,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Shadowsocks => write!(f, "Shadowsocks"),
            ProxyType::Vmess => write!(f, "VMess"),
            ProxyType::Trojan => write!(f, "Trojan"),
            ProxyType::Hysteria2 => write!(f, "Hysteria2"),
            ProxyType::Http => write!(f, "HTTP"),
            ProxyType::Socks5 => write!(f, "SOCKS5"),
            ProxyType::Vless => write!(f, "VLESS"),
            ProxyType::Snell => write!(f, "Snell"),
        }
    }
}

impl TryFrom<&str> for ProxyType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ss" | "shadowsocks" => Ok(ProxyType::Shadowsocks),
            "vmess" => Ok(ProxyType::Vmess),
            "trojan" => Ok(ProxyType::Trojan),
            "hysteria2" | "hy2" => Ok(ProxyType::Hysteria2),
            "http" => Ok(ProxyType::Http),
            "socks5" | "socks" => Ok(ProxyType::Socks5),
            "vless" => Ok(ProxyType::Vless),
            "snell" => Ok(ProxyType::Snell),
            _ => Err(Error::config(format!("Unknown proxy type: {}", s))),
        }
    }
}

/// One health-check sample
#[derive(Debug, Clone, Serialize)]
pub struct DelayHistory {
    pub time: DateTime<Utc>,
    /// Milliseconds, 0 when the probe failed
    pub delay: u16,
}

/// Outbound proxy endpoint
#[derive(Debug)]
pub struct Proxy {
    name: String,
    proxy_type: ProxyType,
    server: String,
    port: u16,
    history: RwLock<VecDeque<DelayHistory>>,
}

impl Proxy {
    pub fn new(name: String, proxy_type: ProxyType, server: String, port: u16) -> Self {
        Proxy {
            name,
            proxy_type,
            server,
            port,
            history: RwLock::new(VecDeque::with_capacity(MAX_HISTORY)),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        config.validate()?;
        let proxy_type = ProxyType::try_from(config.proxy_type.as_str())?;
        Ok(Proxy::new(
            config.name.clone(),
            proxy_type,
            config.server.clone(),
            config.port,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn proxy_type(&self) -> ProxyType {
        self.proxy_type
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Record a probe result, dropping the oldest sample past [`MAX_HISTORY`]
    pub fn record_delay(&self, delay: u16) {
        let mut history = self.history.write();
        if history.len() == MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(DelayHistory {
            time: Utc::now(),
            delay,
        });
    }

    pub fn history(&self) -> Vec<DelayHistory> {
        self.history.read().iter().cloned().collect()
    }

    /// Whether the last probe succeeded (true before any probe ran)
    pub fn alive(&self) -> bool {
        self.history.read().back().map_or(true, |h| h.delay > 0)
    }

    pub fn last_delay(&self) -> u16 {
        self.history.read().back().map_or(0, |h| h.delay)
    }
}
