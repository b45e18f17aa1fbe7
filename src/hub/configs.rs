//! Configs endpoints
//!
//! Reads, replaces and patches the engine configuration.

use super::common::{decode_json, ApiError, ApiResult, ConfigPatch, ReplaceParams, ReplaceRequest};
use super::AppState;
use crate::engine::General;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// GET /configs - Get current configuration
pub async fn get_configs(State(state): State<AppState>) -> Json<General> {
    Json(state.engine.general())
}

/// PUT /configs - Replace configuration from payload or file
pub async fn update_configs(
    State(state): State<AppState>,
    Query(params): Query<ReplaceParams>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let req: ReplaceRequest = decode_json(&body)?;
    let force = params.force();

    let config = if !req.payload().is_empty() {
        debug!("Loading config from payload");
        state
            .engine
            .parse_with_bytes(req.payload().as_bytes())
            .map_err(|e| ApiError::bad_request(e.to_string()))?
    } else {
        let path = Path::new(req.path());
        if !path.is_absolute() {
            return Err(ApiError::bad_request("path is not a absoluted path"));
        }

        debug!("Loading config from path: {}", path.display());
        state
            .engine
            .parse_with_path(path)
            .map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    info!("Replacing configuration (force: {})", force);
    state.engine.apply_config(config, force).await;

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /configs - Patch configuration (partial update)
pub async fn patch_configs(State(state): State<AppState>, body: Bytes) -> ApiResult<StatusCode> {
    let patch: ConfigPatch = decode_json(&body)?;
    let engine = &state.engine;

    if let Some(allow_lan) = patch.allow_lan {
        debug!("Setting allow-lan to: {}", allow_lan);
        engine.set_allow_lan(allow_lan);
    }

    if let Some(bind_address) = patch.bind_address {
        debug!("Setting bind-address to: {}", bind_address);
        engine.set_bind_address(bind_address);
    }

    // Every listener is re-created, absent ports fall back to the live ones
    let ports = engine.ports();
    if let Err(e) = engine.recreate_http(patch.port.unwrap_or(ports.port)).await {
        warn!("Recreate HTTP listener failed: {}", e);
    }
    if let Err(e) = engine.recreate_socks(patch.socks_port.unwrap_or(ports.socks_port)).await {
        warn!("Recreate SOCKS listener failed: {}", e);
    }
    if let Err(e) = engine.recreate_redir(patch.redir_port.unwrap_or(ports.redir_port)).await {
        warn!("Recreate Redir listener failed: {}", e);
    }

    if let Some(mode) = patch.mode {
        debug!("Setting mode to: {}", mode);
        engine.set_mode(mode);
    }

    if let Some(log_level) = patch.log_level {
        debug!("Setting log level to: {}", log_level);
        engine.set_log_level(log_level);
    }

    info!("Configuration patched");
    Ok(StatusCode::NO_CONTENT)
}
