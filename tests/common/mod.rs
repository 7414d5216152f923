//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    routing::any,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use policy_gateway::lifecycle::{self, GatewayOptions, RunningGateway};
use policy_gateway::policy::builtin;
use policy_gateway::reload::{ReloadSettings, ReloadStatus};

pub const CONFIG_FILE: &str = "gateway.config.yml";

/// Start a mock backend that echoes what it received as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new().fallback(any(echo));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(headers: HeaderMap, request: Request) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    (
        StatusCode::OK,
        Json(json!({
            "method": request.method().as_str(),
            "path": request.uri().path(),
            "query": request.uri().query(),
            "host": header("host"),
            "forwardedFor": header("x-forwarded-for"),
            "requestId": header("x-request-id"),
        })),
    )
}

/// Gateway document with listeners on ephemeral ports and the given
/// pipelines section (YAML, indented as a top-level key's value).
pub fn document(backend: SocketAddr, pipelines: &str) -> String {
    format!(
        r#"http:
  port: 0
  hostname: 127.0.0.1
https:
  port: 0
admin:
  port: 0
serviceEndpoints:
  backend:
    url: "http://{backend}"
apiEndpoints:
  api:
    paths: ["/api/*"]
{pipelines}"#
    )
}

pub fn write_config(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

pub fn config_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join(CONFIG_FILE)
}

pub async fn start_gateway(path: &Path, debounce: Duration) -> RunningGateway {
    let options = GatewayOptions {
        config_path: path.to_path_buf(),
        watch: true,
        reload: ReloadSettings {
            debounce,
            max_debounce: debounce * 10,
        },
    };
    lifecycle::start(options, builtin::registry().unwrap())
        .await
        .unwrap()
}

/// Wait until the reload status satisfies `f`, failing after ten seconds.
pub async fn wait_for_status(gateway: &RunningGateway, f: impl Fn(&ReloadStatus) -> bool) -> ReloadStatus {
    let mut status = gateway.status();
    let result = tokio::time::timeout(Duration::from_secs(10), status.wait_for(|s| f(s)))
        .await
        .expect("timed out waiting for reload status")
        .expect("reload controller stopped");
    (*result).clone()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}
