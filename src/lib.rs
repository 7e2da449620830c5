//! Autoreplica Controller Library
//!
//! A Kubernetes controller that gives every unowned Pod a companion ReplicaSet
//! named `<pod>-rs`, running the Pod's first container.
//!
//! ## Quick Start
//!
//! ```rust
//! use autoreplica_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;
