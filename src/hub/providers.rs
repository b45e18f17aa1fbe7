//! Providers endpoints
//!
//! Lists proxy providers and triggers their health checks.

use super::resolve::ResolvedProvider;
use super::AppState;
use crate::provider::ProxyProvider;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::debug;

/// Format proxy provider as JSON
pub(crate) fn format_proxy_provider(provider: &dyn ProxyProvider) -> Value {
    let proxies: Vec<Value> = provider
        .proxies()
        .iter()
        .map(|p| {
            json!({
                "name": p.name(),
                "type": p.proxy_type().to_string(),
                "alive": p.alive(),
                "history": p.history(),
            })
        })
        .collect();

    let mut result = json!({
        "name": provider.name(),
        "type": "Proxy",
        "vehicleType": provider.vehicle_type().to_string(),
        "proxies": proxies,
        "testUrl": provider.health_check_url(),
    });

    if let Some(updated) = provider.updated_at() {
        result["updatedAt"] = json!(updated.to_rfc3339());
    }

    result
}

/// GET /providers/proxies - Get all proxy providers
pub async fn get_proxy_providers(State(state): State<AppState>) -> Json<Value> {
    let providers = state.engine.providers();

    let mut providers_map = serde_json::Map::new();
    for (name, provider) in providers.iter() {
        providers_map.insert(name.clone(), format_proxy_provider(provider.as_ref()));
    }

    Json(json!({ "providers": providers_map }))
}

/// GET /providers/proxies/:name - Get a specific proxy provider
pub async fn get_proxy_provider(ResolvedProvider(provider): ResolvedProvider) -> Json<Value> {
    Json(format_proxy_provider(provider.as_ref()))
}

/// GET /providers/proxies/:name/healthcheck - Health check all proxies in provider
pub async fn healthcheck_proxy_provider(
    ResolvedProvider(provider): ResolvedProvider,
) -> StatusCode {
    debug!("Health check proxy provider: {}", provider.name());
    provider.health_check().await;
    StatusCode::NO_CONTENT
}
