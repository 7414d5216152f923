//! Configuration hot reload.
//!
//! # Data Flow
//! ```text
//! watcher / SIGHUP / admin API
//!     → ReloadTrigger over an mpsc channel
//!     → controller.rs (debounce, validate, compile, commit)
//!     → ReloadStatus over a watch channel (admin, tests)
//! ```

pub mod controller;

pub use controller::{ControllerState, ReloadController, ReloadSettings, ReloadStatus, ReloadTrigger};
