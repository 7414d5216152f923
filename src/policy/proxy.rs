//! `proxy` policy: forward the request to a service endpoint.
//!
//! # Responsibilities
//! - Rewrite the URI onto the service endpoint's base URL
//! - Strip hop-by-hop headers, add `x-forwarded-*` and `x-request-id`
//! - Stream the upstream response back as the pipeline's response
//!
//! # Design Decisions
//! - Always terminal: nothing runs after a proxy step
//! - Upstream connection errors become 502, never handler failures
//! - Plain HTTP upstreams only; the factory rejects other schemes

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::{PolicyBuildError, PolicyError, RegistryError};
use crate::observability::metrics::MetricsSink;
use crate::policy::{Exchange, Flow, HttpClient, PolicyContext, PolicyDescriptor, PolicyHandler};

pub const NAME: &str = "proxy";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyOptions {
    service_endpoint: String,
    change_origin: bool,
    strip_path: bool,
}

struct ProxyPolicy {
    service: String,
    /// Base URL without a trailing slash.
    base: String,
    authority: String,
    change_origin: bool,
    strip_path: bool,
    client: HttpClient,
    metrics: MetricsSink,
}

impl ProxyPolicy {
    fn upstream_uri(&self, exchange: &Exchange) -> Result<Uri, PolicyError> {
        let path = exchange.path();
        let forwarded_path = if self.strip_path {
            let rest = path.strip_prefix(&exchange.matched_prefix).unwrap_or(path);
            if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            }
        } else {
            path.to_string()
        };
        let target = match exchange.parts.uri.query() {
            Some(query) => format!("{}{}?{}", self.base, forwarded_path, query),
            None => format!("{}{}", self.base, forwarded_path),
        };
        target
            .parse::<Uri>()
            .map_err(|e| PolicyError::new(format!("invalid upstream uri `{target}`: {e}")))
    }

    fn upstream_headers(&self, exchange: &Exchange) -> HeaderMap {
        let mut headers = exchange.parts.headers.clone();
        for name in HOP_BY_HOP {
            headers.remove(name);
        }

        let client_ip = exchange.client_addr.ip().to_string();
        let forwarded_for = match headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{existing}, {client_ip}"),
            None => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
        if let Ok(value) = HeaderValue::from_str(&exchange.request_id) {
            headers.insert(HeaderName::from_static("x-request-id"), value);
        }
        if self.change_origin {
            if let Ok(value) = HeaderValue::from_str(&self.authority) {
                headers.insert(header::HOST, value);
            }
        }
        headers
    }

    async fn forward(&self, exchange: &mut Exchange) -> Result<Flow, PolicyError> {
        let uri = self.upstream_uri(exchange)?;
        let headers = self.upstream_headers(exchange);

        let mut request = Request::builder()
            .method(exchange.parts.method.clone())
            .uri(uri)
            .body(exchange.take_body())
            .map_err(|e| PolicyError::new(e.to_string()))?;
        *request.headers_mut() = headers;

        match self.client.request(request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                for name in HOP_BY_HOP {
                    parts.headers.remove(name);
                }
                Ok(Flow::Respond(Response::from_parts(parts, Body::new(body))))
            }
            Err(e) => {
                tracing::error!(
                    request_id = %exchange.request_id,
                    service = %self.service,
                    error = %e,
                    "Upstream error"
                );
                self.metrics.policy_event(NAME, "upstream_error");
                Ok(Flow::Respond(
                    (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response(),
                ))
            }
        }
    }
}

impl PolicyHandler for ProxyPolicy {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Flow, PolicyError>> {
        self.forward(exchange).boxed()
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "serviceEndpoint": { "type": "string", "minLength": 1 },
            "changeOrigin": { "type": "boolean", "default": false },
            "stripPath": { "type": "boolean", "default": false }
        },
        "required": ["serviceEndpoint", "changeOrigin", "stripPath"],
        "additionalProperties": false
    })
}

fn build(options: &Value, ctx: &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
    let options: ProxyOptions = serde_json::from_value(options.clone())
        .map_err(|e| PolicyBuildError::new(e.to_string()))?;
    let url: Url = ctx.service_endpoint(&options.service_endpoint)?;
    if url.scheme() != "http" {
        return Err(PolicyBuildError::new(format!(
            "service endpoint `{}` uses unsupported scheme `{}`",
            options.service_endpoint,
            url.scheme()
        )));
    }
    let host = url.host_str().ok_or_else(|| {
        PolicyBuildError::new(format!(
            "service endpoint `{}` has no host",
            options.service_endpoint
        ))
    })?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let base = format!(
        "{}://{}{}",
        url.scheme(),
        authority,
        url.path().trim_end_matches('/')
    );

    Ok(Arc::new(ProxyPolicy {
        service: options.service_endpoint,
        base,
        authority,
        change_origin: options.change_origin,
        strip_path: options.strip_path,
        client: ctx.http_client(),
        metrics: ctx.metrics(),
    }))
}

pub fn descriptor() -> Result<PolicyDescriptor, RegistryError> {
    Ok(PolicyDescriptor::new(NAME, schema(), build)?.with_service_endpoint_field("serviceEndpoint"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceEndpointConfig;
    use crate::policy::{testing, Infrastructure};
    use std::collections::BTreeMap;

    fn build_with(url: &str, options: Value) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
        let descriptor = descriptor().unwrap();
        let bound = descriptor.bind_options(&options).unwrap();
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "backend".to_string(),
            ServiceEndpointConfig { url: url.to_string() },
        );
        let infrastructure = Infrastructure::new();
        let ctx = PolicyContext::new("test", NAME, 0, &endpoints, &infrastructure);
        descriptor.build(&bound, &ctx)
    }

    fn policy(url: &str, strip_path: bool) -> ProxyPolicy {
        let options: ProxyOptions = serde_json::from_value(json!({
            "serviceEndpoint": "backend",
            "changeOrigin": true,
            "stripPath": strip_path
        }))
        .unwrap();
        let parsed = Url::parse(url).unwrap();
        let authority = format!("{}:{}", parsed.host_str().unwrap(), parsed.port().unwrap());
        ProxyPolicy {
            service: options.service_endpoint,
            base: format!("http://{}{}", authority, parsed.path().trim_end_matches('/')),
            authority,
            change_origin: options.change_origin,
            strip_path: options.strip_path,
            client: Infrastructure::new().http_client(),
            metrics: MetricsSink::new(),
        }
    }

    #[test]
    fn test_service_endpoint_is_required() {
        assert!(descriptor().unwrap().bind_options(&json!({})).is_err());
    }

    #[test]
    fn test_factory_rejects_bad_urls() {
        assert!(build_with("not a url", json!({"serviceEndpoint": "backend"})).is_err());
        assert!(build_with("https://example.com", json!({"serviceEndpoint": "backend"})).is_err());
        assert!(build_with("http://127.0.0.1:3000", json!({"serviceEndpoint": "missing"})).is_err());
        assert!(build_with("http://127.0.0.1:3000", json!({"serviceEndpoint": "backend"})).is_ok());
    }

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let proxy = policy("http://127.0.0.1:3000/base/", false);
        let exchange = testing::exchange("/api/users?page=2", &[]);
        assert_eq!(
            proxy.upstream_uri(&exchange).unwrap().to_string(),
            "http://127.0.0.1:3000/base/api/users?page=2"
        );
    }

    #[test]
    fn test_upstream_uri_strips_matched_prefix() {
        let proxy = policy("http://127.0.0.1:3000", true);
        let mut exchange = testing::exchange("/api/users", &[]);
        exchange.matched_prefix = "/api".into();
        assert_eq!(
            proxy.upstream_uri(&exchange).unwrap().to_string(),
            "http://127.0.0.1:3000/users"
        );
    }

    #[test]
    fn test_upstream_headers() {
        let proxy = policy("http://127.0.0.1:3000", false);
        let exchange = testing::exchange(
            "/",
            &[
                ("connection", "keep-alive"),
                ("x-forwarded-for", "10.0.0.1"),
                ("host", "gateway.local"),
            ],
        );
        let headers = proxy.upstream_headers(&exchange);
        assert!(headers.get("connection").is_none());
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 127.0.0.1");
        assert_eq!(headers["x-request-id"], "test-request");
        assert_eq!(headers["host"], "127.0.0.1:3000");
    }
}
