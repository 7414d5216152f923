//! Policy-driven API gateway library.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod reload;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{GatewayOptions, RunningGateway, Shutdown};
pub use pipeline::{ConfigPublisher, ConfigSnapshot, ExecutionEngine, PipelineCompiler};
pub use policy::{PolicyHandler, PolicyRegistry};
