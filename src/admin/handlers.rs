use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::admin::AdminState;
use crate::config::schema::GatewayConfig;
use crate::reload::{ReloadStatus, ReloadTrigger};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub config_version: u64,
    pub pipelines: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersions {
    pub active: u64,
    pub last_good: Option<u64>,
    pub reloads: ReloadStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInfo {
    pub name: String,
    pub schema: Value,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.publisher.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        config_version: snapshot.version(),
        pipelines: snapshot
            .pipelines()
            .iter()
            .map(|p| p.name().to_string())
            .collect(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Json<GatewayConfig> {
    Json(state.publisher.current().raw().clone())
}

pub async fn get_versions(State(state): State<AdminState>) -> Json<ConfigVersions> {
    Json(ConfigVersions {
        active: state.publisher.version(),
        last_good: state.publisher.last_good().map(|s| s.version()),
        reloads: state.status.borrow().clone(),
    })
}

pub async fn trigger_reload(State(state): State<AdminState>) -> impl IntoResponse {
    match state.triggers.send(ReloadTrigger::Admin) {
        Ok(()) => {
            tracing::info!("Reload requested through admin API");
            (StatusCode::ACCEPTED, Json(json!({ "queued": true })))
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "queued": false, "error": "reload controller is not running" })),
        ),
    }
}

pub async fn get_policies(State(state): State<AdminState>) -> Json<Vec<PolicyInfo>> {
    Json(
        state
            .registry
            .descriptors()
            .map(|d| PolicyInfo {
                name: d.name().to_string(),
                schema: d.schema().raw().clone(),
            })
            .collect(),
    )
}
