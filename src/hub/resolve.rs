//! Provider resolution for `/providers/proxies/:name` routes
//!
//! Two extractor stages run before any provider handler: [`ProviderName`]
//! reads the decoded `name` segment, then [`ResolvedProvider`] looks it up
//! in the registry. A miss rejects the request with 404 and the handler
//! never runs.

use super::common::{ApiError, ApiResult};
use super::AppState;
use crate::engine::EngineControl;
use crate::provider::ProxyProvider;
use axum::{
    async_trait,
    extract::{FromRequestParts, RawPathParams},
    http::{request::Parts, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::debug;

/// Percent-decoded provider name taken from the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderName(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ProviderName
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> ApiResult<Self> {
        // Escapes that do not decode to UTF-8 are rejected here
        let params = RawPathParams::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::not_found())?;

        params
            .iter()
            .find(|(key, _)| *key == "name")
            .map(|(_, value)| ProviderName(value.to_string()))
            .ok_or_else(ApiError::not_found)
    }
}

/// Outcome of a registry lookup
pub enum Resolution {
    Resolved(Arc<dyn ProxyProvider>),
    NotFound,
}

impl Resolution {
    pub fn resolve(engine: &dyn EngineControl, name: &ProviderName) -> Self {
        if name.0.is_empty() {
            return Resolution::NotFound;
        }

        match engine.providers().remove(&name.0) {
            Some(provider) => Resolution::Resolved(provider),
            None => Resolution::NotFound,
        }
    }
}

/// Provider resolved from the request path
pub struct ResolvedProvider(pub Arc<dyn ProxyProvider>);

#[async_trait]
impl FromRequestParts<AppState> for ResolvedProvider {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let name = ProviderName::from_request_parts(parts, state).await?;

        match Resolution::resolve(state.engine.as_ref(), &name) {
            Resolution::Resolved(provider) => Ok(ResolvedProvider(provider)),
            Resolution::NotFound => {
                debug!("Proxy provider {:?} not found", name.0);
                Err(ApiError::not_found())
            }
        }
    }
}
