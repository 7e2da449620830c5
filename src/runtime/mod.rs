//! # Runtime
//!
//! Process-level wiring around the controller.
//!
//! - `error_policy`: retry/drop decisions and failure reporting
//! - `initialization`: rustls, tracing, metrics, probe server and Kubernetes wiring
//! - `watch_loop`: controller start/stop lifecycle

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::{handle_sync_error, FailureReporter, TracingReporter};
pub use watch_loop::{Controller, ControllerError};
