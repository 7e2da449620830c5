//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `autoreplica_reconciliations_total` - Total number of reconciliations
//! - `autoreplica_reconciliation_errors_total` - Reconciliation errors by kind
//! - `autoreplica_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `autoreplica_children_created_total` - ReplicaSets created
//! - `autoreplica_children_already_exist_total` - Creates answered with "already exists"
//! - `autoreplica_create_duration_seconds` - Duration of ReplicaSet create calls
//! - `autoreplica_parent_events_total` - Cache notifications by kind
//! - `autoreplica_suppressed_updates_total` - Updates dropped because nothing changed
//! - `autoreplica_queue_depth` - Keys waiting for a worker
//! - `autoreplica_keys_in_flight` - Keys held by workers
//! - `autoreplica_requeues_total` - Failed keys scheduled for retry
//! - `autoreplica_dropped_keys_total` - Keys dropped after exhausting retries
//! - `autoreplica_abandoned_keys_total` - Failed keys left unretried because the queue shut down
//! - `autoreplica_startup_failures_total` - Fatal startup failures
//! - `autoreplica_cache_synced` - 1 once the parent cache finished its initial list

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autoreplica_reconciliation_errors_total",
            "Total number of reconciliation errors by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "autoreplica_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CHILDREN_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_children_created_total",
        "Total number of child ReplicaSets created",
    )
    .expect("Failed to create CHILDREN_CREATED_TOTAL metric - this should never happen")
});

static CHILDREN_ALREADY_EXIST_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_children_already_exist_total",
        "Total number of creates that found the child already present",
    )
    .expect("Failed to create CHILDREN_ALREADY_EXIST_TOTAL metric - this should never happen")
});

static CREATE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "autoreplica_create_duration_seconds",
            "Duration of ReplicaSet create calls in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create CREATE_DURATION metric - this should never happen")
});

static PARENT_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autoreplica_parent_events_total",
            "Total number of parent cache notifications by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create PARENT_EVENTS_TOTAL metric - this should never happen")
});

static SUPPRESSED_UPDATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_suppressed_updates_total",
        "Total number of updates ignored because old and new were identical",
    )
    .expect("Failed to create SUPPRESSED_UPDATES_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("autoreplica_queue_depth", "Keys waiting for a worker")
        .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static KEYS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("autoreplica_keys_in_flight", "Keys currently held by workers")
        .expect("Failed to create KEYS_IN_FLIGHT metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_requeues_total",
        "Total number of failed keys scheduled for retry",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static DROPPED_KEYS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_dropped_keys_total",
        "Total number of keys dropped without further retries",
    )
    .expect("Failed to create DROPPED_KEYS_TOTAL metric - this should never happen")
});

static ABANDONED_KEYS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_abandoned_keys_total",
        "Total number of failed keys not retried because the queue was shutting down",
    )
    .expect("Failed to create ABANDONED_KEYS_TOTAL metric - this should never happen")
});

static STARTUP_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autoreplica_startup_failures_total",
        "Total number of fatal controller startup failures",
    )
    .expect("Failed to create STARTUP_FAILURES_TOTAL metric - this should never happen")
});

static CACHE_SYNCED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "autoreplica_cache_synced",
        "1 once the parent cache completed its initial list",
    )
    .expect("Failed to create CACHE_SYNCED metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHILDREN_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILDREN_ALREADY_EXIST_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREATE_DURATION.clone()))?;
    REGISTRY.register(Box::new(PARENT_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUPPRESSED_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(KEYS_IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DROPPED_KEYS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ABANDONED_KEYS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STARTUP_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_SYNCED.clone()))?;

    Ok(())
}

pub fn increment_reconciliations_total() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_children_created_total() {
    CHILDREN_CREATED_TOTAL.inc();
}

pub fn increment_children_already_exist_total() {
    CHILDREN_ALREADY_EXIST_TOTAL.inc();
}

pub fn observe_create_duration(duration: f64) {
    CREATE_DURATION.observe(duration);
}

pub fn increment_parent_events_total(kind: &str) {
    PARENT_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_suppressed_updates_total() {
    SUPPRESSED_UPDATES_TOTAL.inc();
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(gauge_value(depth));
}

pub fn set_keys_in_flight(count: usize) {
    KEYS_IN_FLIGHT.set(gauge_value(count));
}

pub fn increment_requeues_total() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_dropped_keys_total() {
    DROPPED_KEYS_TOTAL.inc();
}

pub fn increment_abandoned_keys_total() {
    ABANDONED_KEYS_TOTAL.inc();
}

pub fn increment_startup_failures_total() {
    STARTUP_FAILURES_TOTAL.inc();
}

pub fn set_cache_synced(synced: bool) {
    CACHE_SYNCED.set(i64::from(synced));
}
