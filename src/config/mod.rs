//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse into a raw JSON value)
//!     → validation.rs (document schema, references, policy options)
//!     → GatewayConfig (validated, options bound)
//!     → pipeline compiler
//!
//! On change:
//!     watcher.rs notices a write
//!     → reload controller runs one cycle
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Structural checks run on the raw value before anything is typed
//! - Policy options stay opaque JSON until their descriptor binds them

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{ApiEndpointConfig, GatewayConfig, PipelineConfig, PolicyConfig};
pub use validation::ConfigValidator;
