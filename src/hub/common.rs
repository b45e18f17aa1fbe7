//! Common types for REST API requests, responses and errors

use crate::log::LogLevel;
use crate::tunnel::TunnelMode;
use axum::{body::Bytes, http::StatusCode, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message of the fixed bad-request error
pub const ERR_BAD_REQUEST: &str = "Body invalid";

/// Message of the fixed not-found error
pub const ERR_NOT_FOUND: &str = "Resource not found";

/// API error response
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
        }
    }

    pub fn not_found() -> (StatusCode, Json<ApiError>) {
        (StatusCode::NOT_FOUND, Json(ApiError::new(ERR_NOT_FOUND)))
    }

    pub fn invalid_body() -> (StatusCode, Json<ApiError>) {
        Self::bad_request(ERR_BAD_REQUEST)
    }

    pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
        (StatusCode::BAD_REQUEST, Json(ApiError::new(message)))
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Decode a JSON request body regardless of its content type
pub fn decode_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|_| ApiError::invalid_body())
}

/// Config patch request body
#[derive(Debug, Default, Deserialize)]
pub struct ConfigPatch {
    /// HTTP proxy port
    pub port: Option<u16>,
    /// SOCKS proxy port
    #[serde(rename = "socks-port")]
    pub socks_port: Option<u16>,
    /// Redirect port
    #[serde(rename = "redir-port")]
    pub redir_port: Option<u16>,
    /// Allow LAN connections
    #[serde(rename = "allow-lan")]
    pub allow_lan: Option<bool>,
    /// Bind address
    #[serde(rename = "bind-address")]
    pub bind_address: Option<String>,
    /// Proxy mode (rule/global/direct)
    pub mode: Option<TunnelMode>,
    /// Log level
    #[serde(rename = "log-level")]
    pub log_level: Option<LogLevel>,
}

/// Config replace request body
#[derive(Debug, Default, Deserialize)]
pub struct ReplaceRequest {
    /// Absolute path to config file
    #[serde(default)]
    pub path: Option<String>,
    /// Raw config content, takes precedence over `path`
    #[serde(default)]
    pub payload: Option<String>,
}

impl ReplaceRequest {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or_default()
    }

    pub fn payload(&self) -> &str {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// Query parameters of `PUT /configs`
#[derive(Debug, Default, Deserialize)]
pub struct ReplaceParams {
    pub force: Option<String>,
}

impl ReplaceParams {
    /// Only the literal `true` forces
    pub fn force(&self) -> bool {
        self.force.as_deref() == Some("true")
    }
}
