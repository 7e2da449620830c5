//! # Reconciler
//!
//! Turns a queued key into the child its parent should have.
//!
//! ## Reconciliation Flow
//!
//! 1. Take a key from the [`KeyQueue`](crate::controller::queue::KeyQueue)
//! 2. Look the parent up in the cache (a miss means nothing to do)
//! 3. Synthesize the desired ReplicaSet
//! 4. Create it; "already exists" counts as success
//! 5. On failure hand the key to the error policy for backoff or drop

pub mod desired;
pub mod reconcile;
pub mod types;

pub use desired::{child_name, desired_replica_set, SynthesisError};
pub use types::{ReconcilePolicy, Reconciler, SyncError, SyncOutcome};
