//! Construction context handed to policy factories.

use std::collections::BTreeMap;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::schema::ServiceEndpointConfig;
use crate::error::PolicyBuildError;
use crate::observability::metrics::MetricsSink;

/// Outbound HTTP client shared by every proxying policy.
pub type HttpClient = Client<HttpConnector, Body>;

/// Process-wide infrastructure available to every factory.
///
/// Created once at startup and reused by every compilation, so connection
/// pools survive reloads.
#[derive(Clone)]
pub struct Infrastructure {
    client: HttpClient,
    metrics: MetricsSink,
}

impl Infrastructure {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            metrics: MetricsSink::new(),
        }
    }

    pub fn http_client(&self) -> HttpClient {
        self.client.clone()
    }

    pub fn metrics(&self) -> MetricsSink {
        self.metrics.clone()
    }
}

impl Default for Infrastructure {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view a factory gets while binding one pipeline step.
pub struct PolicyContext<'a> {
    pipeline: &'a str,
    policy: &'a str,
    index: usize,
    service_endpoints: &'a BTreeMap<String, ServiceEndpointConfig>,
    infrastructure: &'a Infrastructure,
}

impl<'a> PolicyContext<'a> {
    pub fn new(
        pipeline: &'a str,
        policy: &'a str,
        index: usize,
        service_endpoints: &'a BTreeMap<String, ServiceEndpointConfig>,
        infrastructure: &'a Infrastructure,
    ) -> Self {
        Self {
            pipeline,
            policy,
            index,
            service_endpoints,
            infrastructure,
        }
    }

    pub fn pipeline(&self) -> &str {
        self.pipeline
    }

    pub fn policy(&self) -> &str {
        self.policy
    }

    /// Position of the step within its pipeline.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolve a named service endpoint to its parsed URL.
    pub fn service_endpoint(&self, name: &str) -> Result<Url, PolicyBuildError> {
        let endpoint = self.service_endpoints.get(name).ok_or_else(|| {
            PolicyBuildError::new(format!("service endpoint `{name}` is not defined"))
        })?;
        Url::parse(&endpoint.url).map_err(|e| {
            PolicyBuildError::new(format!(
                "service endpoint `{name}` has invalid url `{}`: {e}",
                endpoint.url
            ))
        })
    }

    pub fn http_client(&self) -> HttpClient {
        self.infrastructure.http_client()
    }

    pub fn metrics(&self) -> MetricsSink {
        self.infrastructure.metrics()
    }

    /// Span carrying the step's identity, for handlers to log under.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "policy",
            pipeline = %self.pipeline,
            policy = %self.policy,
            index = self.index
        )
    }
}
