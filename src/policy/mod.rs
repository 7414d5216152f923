//! Policy subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     builtin::register_all → registry.rs (name → schema + factory)
//!     → registry frozen behind Arc, read-only afterwards
//!
//! Per configuration cycle:
//!     options → schema.rs (defaults + validation)
//!     → factory(options, context.rs) → bound PolicyHandler
//!
//! Per request:
//!     PolicyHandler::handle(&mut Exchange) → Flow::Next | Flow::Respond
//! ```
//!
//! # Design Decisions
//! - Handlers are bound once per snapshot and shared by all requests
//! - A handler never sees gateway state beyond its own bound options
//! - Short-circuiting is an explicit return value, not an error

pub mod builtin;
pub mod context;
pub mod key_auth;
pub mod log;
pub mod proxy;
pub mod rate_limit;
pub mod registry;
pub mod schema;

use std::net::SocketAddr;

use axum::{body::Body, http::request::Parts, response::Response};
use futures_util::future::BoxFuture;

use crate::error::PolicyError;

pub use context::{HttpClient, Infrastructure, PolicyContext};
pub use registry::{PolicyDescriptor, PolicyFactory, PolicyRegistry};
pub use schema::OptionsSchema;

/// Outcome of a single policy step.
pub enum Flow {
    /// Hand the exchange to the next policy in the pipeline.
    Next,
    /// Stop the pipeline and send this response.
    Respond(Response),
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Next => write!(f, "Next"),
            Flow::Respond(response) => write!(f, "Respond({})", response.status()),
        }
    }
}

/// A request-processing step bound to validated options.
pub trait PolicyHandler: Send + Sync {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange)
        -> BoxFuture<'a, Result<Flow, PolicyError>>;
}

/// Authenticated caller attached by an authentication policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub id: String,
}

/// Mutable per-request state threaded through a pipeline.
pub struct Exchange {
    pub parts: Parts,
    pub body: Body,
    pub client_addr: SocketAddr,
    pub request_id: String,
    /// Pipeline that matched this request.
    pub pipeline: String,
    /// API endpoint that matched this request.
    pub endpoint: String,
    /// Static path prefix of the matched endpoint pattern.
    pub matched_prefix: String,
    /// Version of the snapshot the request executes against.
    pub config_version: u64,
    pub consumer: Option<Consumer>,
}

impl Exchange {
    /// Take ownership of the request body, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }
}
