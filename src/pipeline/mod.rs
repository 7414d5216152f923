//! Pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Write path (reload controller):
//!     validated GatewayConfig
//!     → compiler.rs (bind handlers, compile endpoint rules)
//!     → ConfigSnapshot (immutable candidate)
//!     → publisher.rs (atomic, version-guarded swap)
//!
//! Read path (per request):
//!     publisher.current() → engine.rs (match, run chain) → Response
//! ```

pub mod compiler;
pub mod engine;
pub mod publisher;

pub use compiler::{BoundPolicy, CompiledPipeline, ConfigSnapshot, PipelineCompiler, RouteMatch};
pub use engine::ExecutionEngine;
pub use publisher::{CommitOutcome, ConfigPublisher};
