//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Namespace watched when `WATCH_NAMESPACE` is not set
pub const DEFAULT_WATCH_NAMESPACE: &str = "autoreplica";

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Replica count written into every synthesized ReplicaSet
pub const DEFAULT_CHILD_REPLICAS: i32 = 3;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Failed attempts tolerated per key before it is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// How long startup waits for the parent cache to sync (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Interval between cache readiness checks during startup (milliseconds)
pub const CACHE_SYNC_POLL_INTERVAL_MS: u64 = 100;

/// How long in-flight reconciliations may run after shutdown starts (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Capacity of the change feed channel between the watcher and the translator
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Suffix appended to the parent name to form the child ReplicaSet name
pub const CHILD_NAME_SUFFIX: &str = "-rs";

/// Label copied from the parent into the child selector and template
pub const APP_LABEL: &str = "app";
