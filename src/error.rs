//! Error taxonomy for the gateway.
//!
//! # Design Decisions
//! - Registration errors are startup-only and fatal
//! - Configuration errors never leave the reload controller
//! - Execution errors are per-request and map to a client response

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised while populating or querying the policy registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("policy `{0}` is already registered")]
    DuplicatePolicy(String),

    #[error("unknown policy `{0}`")]
    UnknownPolicy(String),

    #[error("policy `{name}` declares an invalid options schema: {message}")]
    InvalidSchema { name: String, message: String },
}

/// Errors raised while turning a configuration document into a snapshot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration document: {0}")]
    Parse(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Structural(Vec<String>),

    #[error("pipeline `{pipeline}` policy #{index}: unknown policy `{policy}`")]
    UnknownPolicy {
        pipeline: String,
        index: usize,
        policy: String,
    },

    #[error("pipeline `{pipeline}` policy `{policy}` (#{index}): invalid options: {}", .errors.join("; "))]
    PolicyOptionValidation {
        pipeline: String,
        index: usize,
        policy: String,
        errors: Vec<String>,
    },

    #[error("pipeline `{pipeline}` policy `{policy}` (#{index}): failed to build: {message}")]
    PipelineCompile {
        pipeline: String,
        index: usize,
        policy: String,
        message: String,
    },
}

impl ConfigError {
    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "io",
            ConfigError::Parse(_) => "parse",
            ConfigError::Structural(_) => "structural",
            ConfigError::UnknownPolicy { .. } => "unknown_policy",
            ConfigError::PolicyOptionValidation { .. } => "policy_options",
            ConfigError::PipelineCompile { .. } => "compile",
        }
    }
}

/// Error raised by a policy factory while binding a handler.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PolicyBuildError(pub String);

impl PolicyBuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Unexpected failure inside a bound handler while serving a request.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PolicyError(pub String);

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that abort gateway startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("initial configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(std::io::Error),

    #[error("failed to watch configuration: {0}")]
    Watch(#[from] notify::Error),
}

/// Per-request failures.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no pipeline matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("policy `{policy}` failed: {message}")]
    PolicyRuntime { policy: String, message: String },
}

impl IntoResponse for ExecutionError {
    fn into_response(self) -> Response {
        match self {
            ExecutionError::RouteNotFound { .. } => {
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            ExecutionError::PolicyRuntime { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
