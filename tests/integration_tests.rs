//! Integration tests for the control plane REST API
//!
//! Requests are driven through the full router against a recording engine
//! double, so every assertion is about what the handlers asked the engine
//! to do.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use mihomo_hub::hub::{create_router, AppState, ERR_BAD_REQUEST, ERR_NOT_FOUND};
use mihomo_hub::inbound::Ports;
use mihomo_hub::log::{LogController, LogLevel};
use mihomo_hub::outbound::Proxy;
use mihomo_hub::provider::{ProxyProvider, VehicleType};
use mihomo_hub::tunnel::TunnelMode;
use mihomo_hub::{Config, Engine, EngineControl, General, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    SetAllowLan(bool),
    SetBindAddress(String),
    Ports,
    RecreateHttp(u16),
    RecreateSocks(u16),
    RecreateRedir(u16),
    SetMode(TunnelMode),
    SetLogLevel(LogLevel),
    ParseBytes(String),
    ParsePath(PathBuf),
    Apply { mode: TunnelMode, force: bool },
}

struct StubProvider {
    name: String,
    checks: AtomicUsize,
}

impl StubProvider {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(StubProvider {
            name: name.to_string(),
            checks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProxyProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vehicle_type(&self) -> VehicleType {
        VehicleType::Inline
    }

    fn proxies(&self) -> Vec<Arc<Proxy>> {
        Vec::new()
    }

    fn health_check_url(&self) -> &str {
        "http://www.gstatic.com/generate_204"
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn initial(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) {
        self.checks.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {}
}

struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
    ports: Mutex<Ports>,
    providers: HashMap<String, Arc<dyn ProxyProvider>>,
}

impl RecordingEngine {
    fn new(ports: Ports, providers: Vec<Arc<StubProvider>>) -> Arc<Self> {
        Arc::new(RecordingEngine {
            calls: Mutex::new(Vec::new()),
            ports: Mutex::new(ports),
            providers: providers
                .into_iter()
                .map(|p| (p.name.clone(), p as Arc<dyn ProxyProvider>))
                .collect(),
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EngineControl for RecordingEngine {
    fn general(&self) -> General {
        let ports = *self.ports.lock();
        General {
            port: ports.port,
            socks_port: ports.socks_port,
            redir_port: ports.redir_port,
            allow_lan: false,
            bind_address: "*".to_string(),
            mode: TunnelMode::Rule,
            log_level: LogLevel::Info,
        }
    }

    fn set_allow_lan(&self, allow: bool) {
        self.record(Call::SetAllowLan(allow));
    }

    fn set_bind_address(&self, address: String) {
        self.record(Call::SetBindAddress(address));
    }

    fn ports(&self) -> Ports {
        self.record(Call::Ports);
        *self.ports.lock()
    }

    async fn recreate_http(&self, port: u16) -> Result<()> {
        self.record(Call::RecreateHttp(port));
        self.ports.lock().port = port;
        Ok(())
    }

    async fn recreate_socks(&self, port: u16) -> Result<()> {
        self.record(Call::RecreateSocks(port));
        self.ports.lock().socks_port = port;
        Ok(())
    }

    async fn recreate_redir(&self, port: u16) -> Result<()> {
        self.record(Call::RecreateRedir(port));
        // Failures must not reach the caller
        Err(mihomo_hub::Error::listener("redir unsupported"))
    }

    fn set_mode(&self, mode: TunnelMode) {
        self.record(Call::SetMode(mode));
    }

    fn set_log_level(&self, level: LogLevel) {
        self.record(Call::SetLogLevel(level));
    }

    fn providers(&self) -> HashMap<String, Arc<dyn ProxyProvider>> {
        self.providers.clone()
    }

    fn parse_with_bytes(&self, buf: &[u8]) -> Result<Config> {
        self.record(Call::ParseBytes(String::from_utf8_lossy(buf).into_owned()));
        Config::from_bytes(buf)
    }

    fn parse_with_path(&self, path: &Path) -> Result<Config> {
        self.record(Call::ParsePath(path.to_path_buf()));
        Config::load(path)
    }

    async fn apply_config(&self, config: Config, force: bool) {
        self.record(Call::Apply {
            mode: config.mode,
            force,
        });
    }
}

const PORTS: Ports = Ports {
    port: 7890,
    socks_port: 7891,
    redir_port: 7892,
};

fn router_for(engine: Arc<dyn EngineControl>) -> Router {
    create_router(AppState::new(engine))
}

async fn send(router: Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_get_configs_returns_general() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let (status, body) = send(router_for(engine), Method::GET, "/configs", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 7890);
    assert_eq!(body["socks-port"], 7891);
    assert_eq!(body["redir-port"], 7892);
    assert_eq!(body["allow-lan"], false);
    assert_eq!(body["bind-address"], "*");
    assert_eq!(body["mode"], "rule");
    assert_eq!(body["log-level"], "info");
}

#[tokio::test]
async fn test_empty_patch_refreshes_listeners_on_current_ports() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let (status, body) = send(router_for(engine.clone()), Method::PATCH, "/configs", "{}").await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert_eq!(
        engine.calls(),
        vec![
            Call::Ports,
            Call::RecreateHttp(7890),
            Call::RecreateSocks(7891),
            Call::RecreateRedir(7892),
        ]
    );
}

#[tokio::test]
async fn test_single_port_patch_keeps_other_ports() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let (status, _) = send(
        router_for(engine.clone()),
        Method::PATCH,
        "/configs",
        r#"{"socks-port": 1080}"#,
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        engine.calls(),
        vec![
            Call::Ports,
            Call::RecreateHttp(7890),
            Call::RecreateSocks(1080),
            Call::RecreateRedir(7892),
        ]
    );
}

#[tokio::test]
async fn test_full_patch_applies_in_order() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = r#"{
        "port": 8080,
        "socks-port": 1080,
        "redir-port": 0,
        "allow-lan": true,
        "bind-address": "192.168.1.2",
        "mode": "Global",
        "log-level": "warning"
    }"#;
    let (status, _) = send(router_for(engine.clone()), Method::PATCH, "/configs", body).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        engine.calls(),
        vec![
            Call::SetAllowLan(true),
            Call::SetBindAddress("192.168.1.2".to_string()),
            Call::Ports,
            Call::RecreateHttp(8080),
            Call::RecreateSocks(1080),
            Call::RecreateRedir(0),
            Call::SetMode(TunnelMode::Global),
            Call::SetLogLevel(LogLevel::Warning),
        ]
    );
}

#[tokio::test]
async fn test_patch_ignores_unknown_fields() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let (status, _) = send(
        router_for(engine.clone()),
        Method::PATCH,
        "/configs",
        r#"{"ipv6": true, "tun": {"enable": true}, "mode": "direct"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    let calls = engine.calls();
    assert!(calls.contains(&Call::SetMode(TunnelMode::Direct)));
    assert!(!calls.iter().any(|c| matches!(c, Call::SetAllowLan(_) | Call::SetLogLevel(_))));
}

#[tokio::test]
async fn test_patch_decode_failure_applies_nothing() {
    for body in ["", "not json", r#"{"allow-lan": true, "port": "seven"}"#, r#"{"mode": "fastest"}"#] {
        let engine = RecordingEngine::new(PORTS, vec![]);
        let (status, response) = send(router_for(engine.clone()), Method::PATCH, "/configs", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {:?}", body);
        assert_eq!(response["message"], ERR_BAD_REQUEST);
        assert!(engine.calls().is_empty());
    }
}

#[tokio::test]
async fn test_replace_payload_ignores_path() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = r#"{"path": "relative/config.yaml", "payload": "mode: global\n"}"#;
    let (status, _) = send(router_for(engine.clone()), Method::PUT, "/configs", body).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        engine.calls(),
        vec![
            Call::ParseBytes("mode: global\n".to_string()),
            Call::Apply {
                mode: TunnelMode::Global,
                force: false
            },
        ]
    );
}

#[tokio::test]
async fn test_replace_relative_path_rejected_before_parse() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = r#"{"path": "config.yaml", "payload": ""}"#;
    let (status, response) = send(router_for(engine.clone()), Method::PUT, "/configs", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], "path is not a absoluted path");
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_replace_from_absolute_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "mode: direct\n").unwrap();

    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = serde_json::json!({ "path": path }).to_string();
    let (status, _) = send(router_for(engine.clone()), Method::PUT, "/configs?force=true", &body).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        engine.calls(),
        vec![
            Call::ParsePath(path),
            Call::Apply {
                mode: TunnelMode::Direct,
                force: true
            },
        ]
    );
}

#[tokio::test]
async fn test_replace_parse_error_passes_message_through() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = r#"{"payload": "mode: fastest\n"}"#;
    let (status, response) = send(router_for(engine.clone()), Method::PUT, "/configs", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = response["message"].as_str().unwrap();
    assert!(message.contains("Unknown tunnel mode"), "message: {}", message);
    assert!(!engine.calls().iter().any(|c| matches!(c, Call::Apply { .. })));
}

#[tokio::test]
async fn test_replace_missing_file_is_bad_request() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let body = r#"{"path": "/nonexistent/mihomo/config.yaml"}"#;
    let (status, response) = send(router_for(engine.clone()), Method::PUT, "/configs", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["message"].as_str().unwrap().contains("/nonexistent/mihomo/config.yaml"));
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test]
async fn test_replace_decode_failure() {
    let engine = RecordingEngine::new(PORTS, vec![]);
    let (status, response) = send(router_for(engine.clone()), Method::PUT, "/configs", "[1, 2").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], ERR_BAD_REQUEST);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_force_requires_exact_literal() {
    let cases = [
        ("/configs?force=true", true),
        ("/configs?force=True", false),
        ("/configs?force=1", false),
        ("/configs?force=", false),
        ("/configs", false),
    ];

    for (uri, expected) in cases {
        let engine = RecordingEngine::new(PORTS, vec![]);
        let (status, _) = send(
            router_for(engine.clone()),
            Method::PUT,
            uri,
            r#"{"payload": "log-level: debug\n"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT, "uri: {}", uri);
        assert_eq!(
            engine.calls().last(),
            Some(&Call::Apply {
                mode: TunnelMode::Rule,
                force: expected
            }),
            "uri: {}",
            uri
        );
    }
}

#[tokio::test]
async fn test_list_providers() {
    let engine = RecordingEngine::new(PORTS, vec![StubProvider::new("sub-a"), StubProvider::new("sub-b")]);
    let (status, body) = send(router_for(engine), Method::GET, "/providers/proxies", "").await;

    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_object().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers["sub-a"]["name"], "sub-a");
    assert_eq!(providers["sub-b"]["vehicleType"], "Inline");
}

#[tokio::test]
async fn test_get_provider() {
    let engine = RecordingEngine::new(PORTS, vec![StubProvider::new("sub-a")]);
    let (status, body) = send(router_for(engine), Method::GET, "/providers/proxies/sub-a", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "sub-a");
    assert_eq!(body["type"], "Proxy");
    assert_eq!(body["testUrl"], "http://www.gstatic.com/generate_204");
}

#[tokio::test]
async fn test_get_provider_with_escaped_name() {
    let engine = RecordingEngine::new(PORTS, vec![StubProvider::new("my sub/一")]);
    let (status, body) = send(
        router_for(engine),
        Method::GET,
        "/providers/proxies/my%20sub%2F%E4%B8%80",
        "",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "my sub/一");
}

#[tokio::test]
async fn test_unknown_provider_not_found() {
    let known = StubProvider::new("sub-a");
    let engine = RecordingEngine::new(PORTS, vec![known.clone()]);

    for uri in [
        "/providers/proxies/missing",
        "/providers/proxies/missing/healthcheck",
        "/providers/proxies/%FF%FE",
        "/providers/proxies/%FF%FE/healthcheck",
    ] {
        let (status, body) = send(router_for(engine.clone()), Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri: {}", uri);
        assert_eq!(body["message"], ERR_NOT_FOUND);
    }

    assert_eq!(known.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_healthcheck() {
    let known = StubProvider::new("sub-a");
    let engine = RecordingEngine::new(PORTS, vec![known.clone()]);
    let (status, body) = send(
        router_for(engine),
        Method::GET,
        "/providers/proxies/sub-a/healthcheck",
        "",
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert_eq!(known.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_engine_patch_and_replace_end_to_end() {
    let engine = Arc::new(Engine::new(LogController::default()));
    let router = router_for(engine.clone());
    let port = free_port();

    let body = format!(r#"{{"port": {}, "mode": "global"}}"#, port);
    let (status, _) = send(router.clone(), Method::PATCH, "/configs", &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, general) = send(router.clone(), Method::GET, "/configs", "").await;
    assert_eq!(general["port"], port);
    assert_eq!(general["mode"], "global");

    let payload = r#"mode: direct
proxy-providers:
  inline-set:
    type: inline
    payload:
      - {name: hk-01, type: trojan, server: 127.0.0.1, port: 9}
"#;
    let body = serde_json::json!({ "payload": payload }).to_string();
    let (status, _) = send(router.clone(), Method::PUT, "/configs", &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, general) = send(router.clone(), Method::GET, "/configs", "").await;
    assert_eq!(general["mode"], "direct");
    // Without force the listener is left alone
    assert_eq!(general["port"], port);

    let (status, provider) = send(router.clone(), Method::GET, "/providers/proxies/inline-set", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider["proxies"][0]["name"], "hk-01");

    let (status, _) = send(router, Method::GET, "/providers/proxies/inline-set/healthcheck", "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        engine.providers()["inline-set"].proxies()[0].history().len(),
        1
    );

    engine.shutdown().await;
}
