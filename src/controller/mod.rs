//! # Controller
//!
//! Core controller modules for the autoreplica controller.
//!
//! - `backoff`: exponential backoff for failed keys
//! - `events`: change feed to work key translation
//! - `key`: `namespace/name` work keys
//! - `queue`: deduplicating rate-limited work queue
//! - `reconciler`: child synthesis and the reconcile worker

pub mod backoff;
pub mod events;
pub mod key;
pub mod queue;
pub mod reconciler;
