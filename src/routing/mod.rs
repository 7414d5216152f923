//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, method, path)
//!     → endpoint.rs (compiled API endpoint rules)
//!     → matcher.rs (evaluate host / method / path conditions)
//!     → Return: matched prefix or no match
//!
//! Endpoint Compilation (per configuration cycle):
//!     ApiEndpointConfig
//!     → parse host rule, method list, path patterns
//!     → freeze inside the compiled pipeline
//! ```
//!
//! # Design Decisions
//! - Rules compiled with the snapshot, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same endpoint
//! - First match wins (pipeline declaration order)

pub mod endpoint;
pub mod matcher;

pub use endpoint::EndpointRule;
