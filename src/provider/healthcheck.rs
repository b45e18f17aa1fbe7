//! Health Check System
//!
//! Probes every proxy of a provider by opening a TCP connection to its
//! server and records the connect latency in the proxy's history.

use crate::outbound::Proxy;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Per-proxy probe timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check configuration and state
pub struct HealthCheck {
    url: String,
    interval: Duration,
    lazy: bool,
    proxies: RwLock<Vec<Arc<Proxy>>>,
    last_touch: AtomicU64,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

impl HealthCheck {
    pub fn new(url: String, interval: Duration, lazy: bool) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        HealthCheck {
            url,
            interval,
            lazy,
            proxies: RwLock::new(Vec::new()),
            last_touch: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Get health check URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check if auto health check is enabled
    pub fn is_auto(&self) -> bool {
        self.interval > Duration::ZERO
    }

    /// Set proxies to check
    pub async fn set_proxies(&self, proxies: Vec<Arc<Proxy>>) {
        *self.proxies.write().await = proxies;
    }

    /// Run health check for all proxies
    pub async fn check(&self) {
        let proxies = self.proxies.read().await.clone();

        let futures: Vec<_> = proxies
            .iter()
            .map(|proxy| {
                let proxy = proxy.clone();
                async move {
                    let delay = probe(&proxy).await;
                    proxy.record_delay(delay);
                    delay > 0
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;
        let alive = results.iter().filter(|ok| **ok).count();
        debug!("Health check finished: {}/{} alive", alive, results.len());
    }

    /// Start background health check loop
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.lazy {
                        let last = self.last_touch.load(Ordering::Relaxed);
                        if now_secs().saturating_sub(last) > self.interval.as_secs() * 2 {
                            continue;
                        }
                    }

                    self.check().await;
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Touch to mark as recently used
    pub fn touch(&self) {
        self.last_touch.store(now_secs(), Ordering::Relaxed);
    }

    /// Close health check
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Connect latency in milliseconds, 0 on failure or timeout
async fn probe(proxy: &Proxy) -> u16 {
    let start = Instant::now();
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((proxy.server(), proxy.port()))).await {
        Ok(Ok(_)) => start.elapsed().as_millis().clamp(1, u16::MAX as u128) as u16,
        Ok(Err(e)) => {
            debug!("{} health check failed: {}", proxy.name(), e);
            0
        }
        Err(_) => {
            debug!("{} health check timed out", proxy.name());
            0
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
