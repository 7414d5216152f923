//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, TLS termination)
//!     → request.rs (assign request ID)
//!     → pipeline engine (match, run policy chain)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod tls;

pub use request::X_REQUEST_ID;
pub use server::GatewayServer;
