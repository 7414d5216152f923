//! `log` policy: emit a structured log line and continue.

use std::sync::Arc;

use futures_util::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{PolicyBuildError, PolicyError, RegistryError};
use crate::policy::{Exchange, Flow, PolicyContext, PolicyDescriptor, PolicyHandler};

pub const NAME: &str = "log";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Level {
    Debug,
    Info,
    Warn,
}

#[derive(Debug, Deserialize)]
struct LogOptions {
    message: String,
    level: Level,
}

struct LogPolicy {
    options: LogOptions,
    span: tracing::Span,
}

impl PolicyHandler for LogPolicy {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Flow, PolicyError>> {
        self.span.in_scope(|| {
            let method = exchange.parts.method.as_str();
            let path = exchange.path();
            let request_id = exchange.request_id.as_str();
            let message = self.options.message.as_str();
            match self.options.level {
                Level::Debug => tracing::debug!(%request_id, %method, %path, "{message}"),
                Level::Info => tracing::info!(%request_id, %method, %path, "{message}"),
                Level::Warn => tracing::warn!(%request_id, %method, %path, "{message}"),
            }
        });
        async { Ok(Flow::Next) }.boxed()
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "level": { "type": "string", "enum": ["debug", "info", "warn"], "default": "info" }
        },
        "required": ["message", "level"]
    })
}

fn build(options: &Value, ctx: &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
    let options: LogOptions = serde_json::from_value(options.clone())
        .map_err(|e| PolicyBuildError::new(e.to_string()))?;
    Ok(Arc::new(LogPolicy {
        options,
        span: ctx.span(),
    }))
}

pub fn descriptor() -> Result<PolicyDescriptor, RegistryError> {
    PolicyDescriptor::new(NAME, schema(), build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_required_and_level_defaults() {
        let descriptor = descriptor().unwrap();
        assert!(descriptor.bind_options(&json!({})).is_err());

        let bound = descriptor.bind_options(&json!({"message": "hit"})).unwrap();
        assert_eq!(bound["level"], json!("info"));
        assert!(descriptor.bind_options(&json!({"message": "x", "level": "trace"})).is_err());
    }
}
