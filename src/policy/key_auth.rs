//! `key-auth` policy: API key authentication.
//!
//! # Responsibilities
//! - Extract a key from a header (`<scheme> <key>`) or a query parameter
//! - Accept keys listed in options or issued through the admin API
//! - Reject with 401 unless `passThrough` is set
//!
//! # Design Decisions
//! - Issued keys live in a process-wide in-memory store shared by every
//!   bound handler, so they survive configuration reloads
//! - No persistence: a restart forgets issued keys

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use dashmap::DashMap;
use futures_util::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{PolicyBuildError, PolicyError, RegistryError};
use crate::observability::metrics::MetricsSink;
use crate::policy::{Consumer, Exchange, Flow, PolicyContext, PolicyDescriptor, PolicyHandler};

pub const NAME: &str = "key-auth";

/// A key issued through the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IssuedKey {
    pub key: String,
    pub consumer: String,
    pub created_at: u64,
}

/// In-memory store of issued keys.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: DashMap<String, IssuedKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, consumer: Option<String>) -> IssuedKey {
        let key = uuid::Uuid::new_v4().simple().to_string();
        let issued = IssuedKey {
            consumer: consumer.unwrap_or_else(|| format!("consumer-{}", &key[..8])),
            key: key.clone(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        self.keys.insert(key, issued.clone());
        issued
    }

    pub fn revoke(&self, key: &str) -> bool {
        self.keys.remove(key).is_some()
    }

    pub fn lookup(&self, key: &str) -> Option<IssuedKey> {
        self.keys.get(key).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<IssuedKey> {
        let mut keys: Vec<IssuedKey> = self.keys.iter().map(|e| e.value().clone()).collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        keys
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyAuthOptions {
    keys: Vec<String>,
    api_key_header: String,
    api_key_header_scheme: String,
    api_key_field: String,
    disable_headers: bool,
    disable_headers_scheme: bool,
    pass_through: bool,
}

struct KeyAuthPolicy {
    options: KeyAuthOptions,
    static_keys: HashSet<String>,
    store: Arc<KeyStore>,
    metrics: MetricsSink,
}

impl KeyAuthPolicy {
    fn extract_key(&self, exchange: &Exchange) -> Option<String> {
        if !self.options.disable_headers {
            if let Some(value) = exchange.header(&self.options.api_key_header) {
                if self.options.disable_headers_scheme {
                    return Some(value.trim().to_string());
                }
                let mut parts = value.trim().splitn(2, ' ');
                let scheme = parts.next().unwrap_or_default();
                if scheme.eq_ignore_ascii_case(&self.options.api_key_header_scheme) {
                    if let Some(key) = parts.next() {
                        return Some(key.trim().to_string());
                    }
                }
            }
        }
        exchange.query_param(&self.options.api_key_field)
    }

    fn authenticate(&self, key: &str) -> Option<Consumer> {
        if self.static_keys.contains(key) {
            return Some(Consumer {
                id: format!("key:{}", key.chars().take(4).collect::<String>()),
            });
        }
        self.store
            .lookup(key)
            .map(|issued| Consumer { id: issued.consumer })
    }
}

impl PolicyHandler for KeyAuthPolicy {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Flow, PolicyError>> {
        let consumer = self
            .extract_key(exchange)
            .and_then(|key| self.authenticate(&key));

        let flow = match consumer {
            Some(consumer) => {
                exchange.consumer = Some(consumer);
                Flow::Next
            }
            None if self.options.pass_through => Flow::Next,
            None => {
                tracing::debug!(
                    request_id = %exchange.request_id,
                    pipeline = %exchange.pipeline,
                    "Rejected request without a valid API key"
                );
                self.metrics.policy_rejection(NAME);
                Flow::Respond((StatusCode::UNAUTHORIZED, "Unauthorized").into_response())
            }
        };
        async move { Ok(flow) }.boxed()
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keys": { "type": "array", "items": { "type": "string", "minLength": 1 }, "default": [] },
            "apiKeyHeader": { "type": "string", "minLength": 1, "default": "authorization" },
            "apiKeyHeaderScheme": { "type": "string", "default": "apikey" },
            "apiKeyField": { "type": "string", "minLength": 1, "default": "apikey" },
            "disableHeaders": { "type": "boolean", "default": false },
            "disableHeadersScheme": { "type": "boolean", "default": false },
            "passThrough": { "type": "boolean", "default": false }
        },
        "required": [
            "keys", "apiKeyHeader", "apiKeyHeaderScheme", "apiKeyField",
            "disableHeaders", "disableHeadersScheme", "passThrough"
        ],
        "additionalProperties": false
    })
}

fn build(
    options: &Value,
    ctx: &PolicyContext<'_>,
    store: Arc<KeyStore>,
) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
    let options: KeyAuthOptions = serde_json::from_value(options.clone())
        .map_err(|e| PolicyBuildError::new(e.to_string()))?;
    Ok(Arc::new(KeyAuthPolicy {
        static_keys: options.keys.iter().cloned().collect(),
        options,
        store,
        metrics: ctx.metrics(),
    }))
}

pub fn descriptor(store: Arc<KeyStore>) -> Result<PolicyDescriptor, RegistryError> {
    let factory_store = Arc::clone(&store);
    Ok(
        PolicyDescriptor::new(NAME, schema(), move |options, ctx| {
            build(options, ctx, Arc::clone(&factory_store))
        })?
        .with_admin_routes(admin_routes(store)),
    )
}

/// Admin routes for managing issued keys.
pub fn admin_routes(store: Arc<KeyStore>) -> Router {
    Router::new()
        .route("/key-auth/keys", get(list_keys).post(issue_key))
        .route("/key-auth/keys/{key}", delete(revoke_key))
        .with_state(store)
}

#[derive(Debug, Default, Deserialize)]
struct IssueRequest {
    consumer: Option<String>,
}

async fn list_keys(State(store): State<Arc<KeyStore>>) -> Json<Vec<IssuedKey>> {
    Json(store.list())
}

async fn issue_key(State(store): State<Arc<KeyStore>>, body: Bytes) -> impl IntoResponse {
    let request = if body.is_empty() {
        IssueRequest::default()
    } else {
        match serde_json::from_slice::<IssueRequest>(&body) {
            Ok(request) => request,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };
    let issued = store.issue(request.consumer);
    tracing::info!(consumer = %issued.consumer, "Issued API key");
    (StatusCode::CREATED, Json(issued)).into_response()
}

async fn revoke_key(State(store): State<Arc<KeyStore>>, Path(key): Path<String>) -> StatusCode {
    if store.revoke(&key) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::testing;

    fn policy(options: Value) -> (Arc<KeyStore>, Arc<dyn PolicyHandler>) {
        let store = Arc::new(KeyStore::new());
        let descriptor = descriptor(Arc::clone(&store)).unwrap();
        let handler = testing::bind(&descriptor, options);
        (store, handler)
    }

    fn status(flow: Flow) -> Option<StatusCode> {
        match flow {
            Flow::Next => None,
            Flow::Respond(response) => Some(response.status()),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let (_, handler) = policy(json!({"keys": ["secret"]}));
        let mut exchange = testing::exchange("/api", &[]);
        let flow = handler.handle(&mut exchange).await.unwrap();
        assert_eq!(status(flow), Some(StatusCode::UNAUTHORIZED));
        assert!(exchange.consumer.is_none());
    }

    #[tokio::test]
    async fn test_header_key_with_scheme_is_accepted() {
        let (_, handler) = policy(json!({"keys": ["secret"]}));
        let mut exchange = testing::exchange("/api", &[("authorization", "apikey secret")]);
        let flow = handler.handle(&mut exchange).await.unwrap();
        assert_eq!(status(flow), None);
        assert!(exchange.consumer.is_some());

        let mut wrong_scheme = testing::exchange("/api", &[("authorization", "Bearer secret")]);
        let flow = handler.handle(&mut wrong_scheme).await.unwrap();
        assert_eq!(status(flow), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_query_key_and_disabled_headers() {
        let (_, handler) = policy(json!({"keys": ["secret"], "disableHeaders": true}));

        let mut header_only = testing::exchange("/api", &[("authorization", "apikey secret")]);
        let flow = handler.handle(&mut header_only).await.unwrap();
        assert_eq!(status(flow), Some(StatusCode::UNAUTHORIZED));

        let mut query = testing::exchange("/api?apikey=secret", &[]);
        let flow = handler.handle(&mut query).await.unwrap();
        assert_eq!(status(flow), None);
    }

    #[tokio::test]
    async fn test_issued_key_is_accepted_until_revoked() {
        let (store, handler) = policy(json!({}));
        let issued = store.issue(Some("alice".into()));
        let header = format!("apikey {}", issued.key);

        let mut exchange = testing::exchange("/api", &[("authorization", header.as_str())]);
        let flow = handler.handle(&mut exchange).await.unwrap();
        assert_eq!(status(flow), None);
        assert_eq!(exchange.consumer.unwrap().id, "alice");

        assert!(store.revoke(&issued.key));
        let mut exchange = testing::exchange("/api", &[("authorization", header.as_str())]);
        let flow = handler.handle(&mut exchange).await.unwrap();
        assert_eq!(status(flow), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_pass_through_continues_without_consumer() {
        let (_, handler) = policy(json!({"passThrough": true}));
        let mut exchange = testing::exchange("/api", &[]);
        let flow = handler.handle(&mut exchange).await.unwrap();
        assert_eq!(status(flow), None);
        assert!(exchange.consumer.is_none());
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let descriptor = descriptor(Arc::new(KeyStore::new())).unwrap();
        assert!(descriptor.bind_options(&json!({"keyz": []})).is_err());
        assert!(descriptor.bind_options(&json!({"passThrough": "yes"})).is_err());
    }
}
