//! # Parent Cache
//!
//! Read side of the locally mirrored Pod store and its change feed.
//!
//! The cache is eventually consistent: lookups may return an older version of a
//! Pod, and the feed may deliver events out of order or redeliver unchanged
//! objects on resync. The reconciler is level-triggered and only ever acts on
//! what `get` returns at the time a key is processed.

use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

pub mod reflector;

pub use reflector::{spawn_feed, spawn_reflector, FeedDiff, ReflectorCache};

/// Point lookups into the mirrored store
pub trait ParentCache: Send + Sync {
    /// Current cached copy of a Pod, if present
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Pod>>;

    /// Whether the initial list has completed
    fn synced(&self) -> bool;
}

/// Change notification delivered by the cache feed
#[derive(Debug, Clone, PartialEq)]
pub enum ParentEvent {
    Added(Arc<Pod>),
    Updated { old: Arc<Pod>, new: Arc<Pod> },
    Deleted(Arc<Pod>),
}

impl ParentEvent {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated { .. } => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}
