//! Unix Domain Socket server for IPC communication
//!
//! Serves the same router as the TCP controller so local GUI clients can
//! reach the control plane without opening a port.

use super::{create_router, AppState};
use crate::Result;

use hyper_util::rt::TokioIo;
use std::path::Path;
use tokio::net::UnixListener;
use tower::Service;
use tracing::{error, info, warn};

/// Start Unix Domain Socket server for IPC communication
///
/// # Arguments
/// * `state` - Application state shared with HTTP server
/// * `socket_path` - Unix socket path (e.g., `/tmp/mihomo-12345.sock`)
pub async fn start_unix_socket_server(state: AppState, socket_path: &str) -> Result<()> {
    let path = Path::new(socket_path);

    // Stale socket from a previous run
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove existing socket file: {}", e);
        }
    }

    let listener = match UnixListener::bind(path) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind Unix Socket on {}: {}", socket_path, e);
            return Err(e.into());
        }
    };

    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            warn!("Failed to set socket permissions: {}", e);
        }
    }

    info!("Unix Socket server listening on {}", socket_path);

    let router = create_router(state);

    loop {
        let (socket, _addr) = listener.accept().await?;
        let tower_service = router.clone();

        tokio::spawn(async move {
            let socket = TokioIo::new(socket);
            let hyper_service = hyper::service::service_fn(move |req| {
                tower_service.clone().call(req)
            });

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(
                hyper_util::rt::TokioExecutor::new(),
            )
            .serve_connection(socket, hyper_service)
            .await
            {
                warn!("Unix socket connection error: {}", e);
            }
        });
    }
}

/// Cleanup Unix socket file on shutdown
pub fn cleanup_socket(socket_path: &str) {
    let path = Path::new(socket_path);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to cleanup socket file {}: {}", socket_path, e);
        } else {
            info!("Cleaned up socket file: {}", socket_path);
        }
    }
}
