//! # Autoreplica Controller
//!
//! Watches Pods and makes sure every unowned Pod has a ReplicaSet named
//! `<pod>-rs` running the Pod's first container with a fixed replica count.
//!
//! ## Overview
//!
//! 1. **Mirror Pods** - A reflector keeps a local cache of Pods in the watched namespace
//! 2. **Translate changes** - Cache notifications become deduplicated work keys
//! 3. **Reconcile** - Workers create the missing child; "already exists" is success
//! 4. **Retry** - Failures back off exponentially and are dropped after a retry budget
//!
//! Configuration comes from environment variables, see [`ControllerConfig`].
//!
//! [`ControllerConfig`]: autoreplica_controller::config::ControllerConfig

use anyhow::Result;
use autoreplica_controller::runtime::initialization::{
    initialize, shutdown_signal, InitializationResult,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let InitializationResult {
        controller,
        events,
        background,
        reflector,
        server,
        ..
    } = initialize().await?;

    let stopper = Arc::clone(&controller);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        stopper.stop();
    });

    let result = controller.start(events).await;

    background.cancel();
    if let Err(e) = reflector.await {
        warn!("Pod watch task ended abnormally: {}", e);
    }
    if let Err(e) = server.await {
        warn!("HTTP server task ended abnormally: {}", e);
    }

    result?;
    Ok(())
}
