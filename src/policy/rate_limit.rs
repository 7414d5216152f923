//! `rate-limit` policy: token bucket per client IP or consumer.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
};
use dashmap::DashMap;
use futures_util::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{PolicyBuildError, PolicyError, RegistryError};
use crate::observability::metrics::MetricsSink;
use crate::policy::{Exchange, Flow, PolicyContext, PolicyDescriptor, PolicyHandler};

pub const NAME: &str = "rate-limit";

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LimitBy {
    Ip,
    Consumer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitOptions {
    max: u32,
    window_ms: u64,
    rate_limit_by: LimitBy,
}

struct RateLimitPolicy {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
    limit_by: LimitBy,
    metrics: MetricsSink,
}

impl RateLimitPolicy {
    fn key(&self, exchange: &Exchange) -> String {
        match (self.limit_by, &exchange.consumer) {
            (LimitBy::Consumer, Some(consumer)) => format!("consumer:{}", consumer.id),
            _ => format!("ip:{}", exchange.client_addr.ip()),
        }
    }

    fn check(&self, key: String) -> bool {
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_acquire(self.capacity, self.refill_rate)
    }
}

impl PolicyHandler for RateLimitPolicy {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Flow, PolicyError>> {
        let key = self.key(exchange);
        let flow = if self.check(key.clone()) {
            Flow::Next
        } else {
            tracing::warn!(client = %key, pipeline = %exchange.pipeline, "Rate limit exceeded");
            self.metrics.policy_rejection(NAME);
            let mut response = (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
            let retry_after = (1.0 / self.refill_rate).ceil().max(1.0) as u64;
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after));
            Flow::Respond(response)
        };
        async move { Ok(flow) }.boxed()
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "max": { "type": "integer", "minimum": 1, "default": 10 },
            "windowMs": { "type": "integer", "minimum": 1, "default": 1000 },
            "rateLimitBy": { "type": "string", "enum": ["ip", "consumer"], "default": "ip" }
        },
        "required": ["max", "windowMs", "rateLimitBy"],
        "additionalProperties": false
    })
}

fn build(options: &Value, ctx: &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
    let options: RateLimitOptions = serde_json::from_value(options.clone())
        .map_err(|e| PolicyBuildError::new(e.to_string()))?;
    let capacity = f64::from(options.max);
    let window_secs = options.window_ms as f64 / 1000.0;
    Ok(Arc::new(RateLimitPolicy {
        buckets: DashMap::new(),
        capacity,
        refill_rate: capacity / window_secs,
        limit_by: options.rate_limit_by,
        metrics: ctx.metrics(),
    }))
}

pub fn descriptor() -> Result<PolicyDescriptor, RegistryError> {
    PolicyDescriptor::new(NAME, schema(), build)
}
