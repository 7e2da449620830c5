//! # Observability
//!
//! Prometheus metrics for the controller. Logging goes through `tracing`.

pub mod metrics;

pub use metrics::register_metrics;
