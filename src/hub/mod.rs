//! REST API Server (hub) - mihomo compatible control plane
//!
//! Serves the configuration and proxy provider endpoints over HTTP and,
//! on Unix, over a Unix Domain Socket.

mod common;
mod configs;
mod providers;
mod resolve;

#[cfg(unix)]
pub mod ipc_unix;

pub use common::{
    ApiError, ApiResult, ConfigPatch, ReplaceParams, ReplaceRequest, ERR_BAD_REQUEST,
    ERR_NOT_FOUND,
};
pub use resolve::{ProviderName, Resolution, ResolvedProvider};

#[cfg(unix)]
pub use ipc_unix::{cleanup_socket, start_unix_socket_server};

use crate::engine::EngineControl;
use crate::{Result, META, VERSION};

use axum::{
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Engine the control plane drives
    pub engine: Arc<dyn EngineControl>,
}

impl AppState {
    pub fn new(engine: Arc<dyn EngineControl>) -> Self {
        AppState { engine }
    }
}

fn config_router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(configs::get_configs)
            .put(configs::update_configs)
            .patch(configs::patch_configs),
    )
}

fn proxy_provider_router() -> Router<AppState> {
    Router::new()
        .route("/", get(providers::get_proxy_providers))
        .route("/:name", get(providers::get_proxy_provider))
        .route("/:name/healthcheck", get(providers::healthcheck_proxy_provider))
}

/// Create the main router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(hello))
        .route("/version", get(version))
        .nest("/configs", config_router())
        .nest("/providers/proxies", proxy_provider_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = create_router(state);
    info!("Starting REST API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn hello() -> Json<Value> {
    Json(json!({ "hello": "mihomo" }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": format!("mihomo Rust {}", VERSION),
        "meta": META,
        "premium": false
    }))
}
