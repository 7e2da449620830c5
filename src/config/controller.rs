//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::backoff::ExponentialBackoff;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace whose Pods are watched
    /// `None` watches every namespace
    pub namespace: Option<String>,
    /// Number of concurrent reconcile workers
    pub workers: usize,
    /// Replica count written into synthesized ReplicaSets
    pub replicas: i32,
    /// Exponential backoff starting value (milliseconds)
    /// Delay before the first retry of a failed key
    pub backoff_base_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    /// Maximum delay between retries
    pub backoff_max_ms: u64,
    /// Randomize each backoff delay within its upper half
    pub backoff_jitter: bool,
    /// Failed attempts tolerated per key before it is dropped and reported
    pub max_retries: u32,
    /// Drop keys failing with unauthorized/invalid errors without retrying
    pub drop_terminal_errors: bool,
    /// How long startup waits for the parent cache to sync (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Upper bound on a single child create call (seconds, 0 disables)
    pub sync_timeout_secs: u64,
    /// How long in-flight reconciliations may run once shutdown starts (seconds)
    pub shutdown_grace_secs: u64,
    /// Capacity of the change feed channel
    pub event_buffer: usize,
    /// Port for the metrics and probe server
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            namespace: Some(DEFAULT_WATCH_NAMESPACE.to_string()),
            workers: DEFAULT_WORKER_COUNT,
            replicas: DEFAULT_CHILD_REPLICAS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            backoff_jitter: false,
            max_retries: DEFAULT_MAX_RETRIES,
            drop_terminal_errors: false,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            sync_timeout_secs: 0,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Values that are missing or fail to parse fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let namespace = match lookup("WATCH_NAMESPACE") {
            Some(ns) if ns.trim().is_empty() => None,
            Some(ns) => Some(ns.trim().to_string()),
            None => defaults.namespace,
        };

        Self {
            namespace,
            workers: parse_or(&lookup, "WORKER_COUNT", defaults.workers).max(1),
            replicas: parse_or(&lookup, "CHILD_REPLICAS", defaults.replicas),
            backoff_base_ms: parse_or(&lookup, "BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_max_ms: parse_or(&lookup, "BACKOFF_MAX_MS", defaults.backoff_max_ms),
            backoff_jitter: bool_or(&lookup, "BACKOFF_JITTER", defaults.backoff_jitter),
            max_retries: parse_or(&lookup, "MAX_RETRIES", defaults.max_retries),
            drop_terminal_errors: bool_or(
                &lookup,
                "DROP_TERMINAL_ERRORS",
                defaults.drop_terminal_errors,
            ),
            cache_sync_timeout_secs: parse_or(
                &lookup,
                "CACHE_SYNC_TIMEOUT_SECS",
                defaults.cache_sync_timeout_secs,
            ),
            sync_timeout_secs: parse_or(&lookup, "SYNC_TIMEOUT_SECS", defaults.sync_timeout_secs),
            shutdown_grace_secs: parse_or(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace_secs,
            ),
            event_buffer: parse_or(&lookup, "EVENT_BUFFER", defaults.event_buffer).max(1),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Backoff calculator for failed keys
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
        .with_jitter(self.backoff_jitter)
    }

    /// Get cache sync timeout duration
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// Get per-call create timeout, if enabled
    pub fn sync_timeout(&self) -> Option<Duration> {
        (self.sync_timeout_secs > 0).then(|| Duration::from_secs(self.sync_timeout_secs))
    }

    /// Get shutdown grace duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Read a typed value or return default value
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean or return default
fn bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.namespace.as_deref(), Some("autoreplica"));
        assert_eq!(config.replicas, 3);
        assert_eq!(config.sync_timeout(), None);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("WATCH_NAMESPACE", "default"),
            ("WORKER_COUNT", "4"),
            ("MAX_RETRIES", "3"),
            ("BACKOFF_JITTER", "yes"),
            ("DROP_TERMINAL_ERRORS", "TRUE"),
            ("SYNC_TIMEOUT_SECS", "10"),
        ]));
        assert_eq!(config.namespace.as_deref(), Some("default"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_retries, 3);
        assert!(config.backoff_jitter);
        assert!(config.drop_terminal_errors);
        assert_eq!(config.sync_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_empty_namespace_watches_all() {
        let config = ControllerConfig::from_lookup(lookup_from(&[("WATCH_NAMESPACE", "  ")]));
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("WORKER_COUNT", "0"),
            ("MAX_RETRIES", "lots"),
            ("METRICS_PORT", "99999"),
        ]));
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.metrics_port, 8080);
    }
}
