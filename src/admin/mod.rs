//! Administrative API.
//!
//! # Routes
//! - `GET /status`: gateway and active configuration summary
//! - `GET /config`: the active, validated configuration
//! - `GET /config/versions`: active and last-good versions, reload counters
//! - `POST /config/reload`: queue a reload cycle
//! - `GET /policies`: registered policies and their option schemas
//! - plus routes contributed by registered policies
//!
//! Every route sits behind the bearer-key check when `admin.apiKey` is set.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;

use self::auth::{admin_auth_middleware, AdminAuth};
use self::handlers::*;
use crate::lifecycle::Shutdown;
use crate::pipeline::ConfigPublisher;
use crate::policy::PolicyRegistry;
use crate::reload::{ReloadStatus, ReloadTrigger};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub publisher: Arc<ConfigPublisher>,
    pub registry: Arc<PolicyRegistry>,
    pub status: watch::Receiver<ReloadStatus>,
    pub triggers: mpsc::UnboundedSender<ReloadTrigger>,
}

pub fn setup_admin_router(state: AdminState, auth: AdminAuth) -> Router {
    let contributed = state.registry.admin_routes();
    Router::new()
        .route("/status", get(get_status))
        .route("/config", get(get_config))
        .route("/config/versions", get(get_versions))
        .route("/config/reload", post(trigger_reload))
        .route("/policies", get(get_policies))
        .with_state(state)
        .merge(contributed)
        .layer(middleware::from_fn_with_state(auth, admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API on `listener` until shutdown.
pub async fn serve(listener: TcpListener, router: Router, shutdown: Shutdown) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin listener started");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    tracing::info!(address = %addr, "Admin listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValidator;
    use crate::pipeline::PipelineCompiler;
    use crate::policy::{builtin, Infrastructure};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state() -> (AdminState, mpsc::UnboundedReceiver<ReloadTrigger>) {
        let registry = Arc::new(builtin::registry().unwrap());
        let config = ConfigValidator::new(Arc::clone(&registry))
            .unwrap()
            .validate(&json!({
                "http": {"port": 8080},
                "https": {"port": 8443},
                "admin": {"port": 9876},
                "apiEndpoints": {"all": {}},
                "pipelines": [{"name": "main", "apiEndpoints": "all"}]
            }))
            .unwrap();
        let snapshot = PipelineCompiler::new(Arc::clone(&registry), Infrastructure::new())
            .compile(config, 1)
            .unwrap();
        let (_status_tx, status) = watch::channel(ReloadStatus::default());
        let (triggers, rx) = mpsc::unbounded_channel();
        (
            AdminState {
                publisher: Arc::new(ConfigPublisher::new(snapshot)),
                registry,
                status,
                triggers,
            },
            rx,
        )
    }

    async fn send(router: Router, method: &str, uri: &str, auth: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_status_reports_active_snapshot() {
        let (state, _rx) = state();
        let router = setup_admin_router(state, AdminAuth::default());
        let (status, body) = send(router, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configVersion"], 1);
        assert_eq!(body["pipelines"], json!(["main"]));
    }

    #[tokio::test]
    async fn test_reload_queues_trigger() {
        let (state, mut rx) = state();
        let router = setup_admin_router(state, AdminAuth::default());
        let (status, _) = send(router, "POST", "/config/reload", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(rx.try_recv().unwrap(), ReloadTrigger::Admin);
    }

    #[tokio::test]
    async fn test_api_key_guards_every_route() {
        let (state, _rx) = state();
        let router = setup_admin_router(state, AdminAuth::new(Some("secret")));

        let (status, _) = send(router.clone(), "GET", "/config", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(router.clone(), "GET", "/key-auth/keys", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(router, "GET", "/config", Some("Bearer secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["http"]["port"], 8080);
    }

    #[tokio::test]
    async fn test_policy_routes_are_mounted() {
        let (state, _rx) = state();
        let router = setup_admin_router(state, AdminAuth::default());

        let (status, issued) = send(router.clone(), "POST", "/key-auth/keys", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(issued["key"].is_string());

        let (_, policies) = send(router, "GET", "/policies", None).await;
        let names: Vec<&str> = policies
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["log", "key-auth", "rate-limit", "proxy"]);
    }
}
