//! Mihomo Hub - runtime control plane for a mihomo-compatible proxy engine
//!
//! Lets an operator inspect and change the live configuration of the engine
//! (listener ports, LAN access, bind address, traffic mode, log level) and
//! trigger provider health checks, all without a restart.
//!
//! # Architecture
//!
//! ```text
//!                 +----------------+
//!                 |   hub/ (API)   |
//!                 +-------+--------+
//!                         | EngineControl
//!                 +-------v--------+
//!                 |    engine/     |
//!                 +-------+--------+
//!                         |
//!     +-----------+-------+-------+-----------+
//!     |           |               |           |
//! +---v----+ +----v-----+  +------v-----+ +---v---+
//! |config/ | | inbound/ |  |  tunnel/   | | log/  |
//! +--------+ +----------+  +------+-----+ +-------+
//!                                 |
//!                          +------v-----+
//!                          | provider/  |
//!                          +------------+
//! ```

pub mod common;
pub mod config;
pub mod engine;
pub mod hub;
pub mod inbound;
pub mod log;
pub mod outbound;
pub mod provider;
pub mod tunnel;

pub use common::error::{Error, Result};
pub use config::Config;
pub use engine::{Engine, EngineControl, General};

use hub::AppState;
use crate::log::LogController;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Mihomo version (compatible with Go version)
pub const VERSION: &str = "1.10.0";
pub const META: bool = true;

/// Gateway instance managing the engine and the control plane servers
pub struct Gateway {
    engine: Arc<Engine>,
    api_addr: Option<SocketAddr>,
    #[cfg(unix)]
    api_unix: Option<String>,
}

impl Gateway {
    /// Create a new Gateway and apply the startup configuration
    pub async fn new(config: Config, log: LogController) -> Result<Self> {
        info!("Initializing Mihomo Hub v{}", VERSION);

        let api_addr = match config.external_controller.as_deref() {
            Some(addr) => Some(addr.parse::<SocketAddr>().map_err(|e| {
                Error::config(format!("Invalid external-controller {}: {}", addr, e))
            })?),
            None => None,
        };

        #[cfg(unix)]
        let api_unix = config.external_controller_unix.clone();

        let engine = Arc::new(Engine::new(log));
        engine.apply_config(config, true).await;

        Ok(Gateway {
            engine,
            api_addr,
            #[cfg(unix)]
            api_unix,
        })
    }

    /// Start the control plane servers and wait for Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        if let Some(addr) = self.api_addr {
            let state = self.create_app_state();
            handles.push(tokio::spawn(async move {
                if let Err(e) = hub::start_server(state, addr).await {
                    warn!("REST API server error: {}", e);
                }
            }));
        }

        #[cfg(unix)]
        if let Some(ref unix_path) = self.api_unix {
            let state = self.create_app_state();
            let socket_path = unix_path.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = hub::start_unix_socket_server(state, &socket_path).await {
                    warn!("Unix Socket server error: {}", e);
                }
            }));
        }

        if handles.is_empty() {
            warn!("No external controller configured, control plane unreachable");
        }

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");

        for handle in handles {
            handle.abort();
        }
        self.engine.shutdown().await;

        #[cfg(unix)]
        if let Some(ref unix_path) = self.api_unix {
            hub::cleanup_socket(unix_path);
        }

        info!("Gateway stopped");
        Ok(())
    }

    /// Create AppState for the REST API
    fn create_app_state(&self) -> AppState {
        AppState::new(self.engine.clone())
    }

    /// Engine reference
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}
