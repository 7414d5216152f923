//! Request execution.
//!
//! # Responsibilities
//! - Read the active snapshot exactly once per request
//! - Select the first pipeline whose endpoint matches
//! - Run the bound handlers in order until one responds
//!
//! # Design Decisions
//! - The snapshot `Arc` is held for the whole request, so a concurrent
//!   reload never mixes handlers from two versions
//! - A handler error or panic fails only its own request (500)
//! - A chain that finishes without responding is treated as not found

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::error::ExecutionError;
use crate::observability::metrics;
use crate::pipeline::publisher::ConfigPublisher;
use crate::policy::{Exchange, Flow};

/// Executes client requests against the active snapshot.
#[derive(Clone)]
pub struct ExecutionEngine {
    publisher: Arc<ConfigPublisher>,
}

impl ExecutionEngine {
    pub fn new(publisher: Arc<ConfigPublisher>) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &Arc<ConfigPublisher> {
        &self.publisher
    }

    pub async fn execute(&self, request: Request<Body>, client_addr: SocketAddr) -> Response {
        let start = Instant::now();
        let snapshot = self.publisher.current();
        let (parts, body) = request.into_parts();

        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let Some(route) = snapshot.match_request(&parts) else {
            tracing::debug!(
                request_id = %request_id,
                method = %parts.method,
                path = %parts.uri.path(),
                "No pipeline matched"
            );
            let error = ExecutionError::RouteNotFound {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
            };
            metrics::record_request("none", 404, start);
            return error.into_response();
        };

        let pipeline = route.pipeline;
        let mut exchange = Exchange {
            parts,
            body,
            client_addr,
            request_id,
            pipeline: pipeline.name().to_string(),
            endpoint: route.endpoint.name().to_string(),
            matched_prefix: route.matched_prefix,
            config_version: snapshot.version(),
            consumer: None,
        };

        tracing::debug!(
            request_id = %exchange.request_id,
            pipeline = %exchange.pipeline,
            version = exchange.config_version,
            "Executing pipeline"
        );

        for step in pipeline.policies() {
            let outcome = AssertUnwindSafe(step.handler.handle(&mut exchange))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(Flow::Next)) => continue,
                Ok(Ok(Flow::Respond(response))) => {
                    metrics::record_request(pipeline.name(), response.status().as_u16(), start);
                    return response;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handler panicked".to_string(),
            };

            tracing::error!(
                request_id = %exchange.request_id,
                pipeline = %exchange.pipeline,
                policy = %step.name,
                error = %failure,
                "Policy failed"
            );
            let error = ExecutionError::PolicyRuntime {
                policy: step.name.clone(),
                message: failure,
            };
            metrics::record_request(pipeline.name(), 500, start);
            return error.into_response();
        }

        tracing::debug!(
            request_id = %exchange.request_id,
            pipeline = %exchange.pipeline,
            "Pipeline finished without a response"
        );
        metrics::record_request(pipeline.name(), 404, start);
        ExecutionError::RouteNotFound {
            method: exchange.parts.method.to_string(),
            path: exchange.path().to_string(),
        }
        .into_response()
    }
}
