//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::cache::{spawn_reflector, ParentEvent};
use crate::config::ControllerConfig;
use crate::observability;
use crate::provider::KubeReplicaSets;
use crate::runtime::error_policy::TracingReporter;
use crate::runtime::watch_loop::Controller;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything `main` needs to run and tear down the controller
pub struct InitializationResult {
    /// Controller, shared with the signal handler
    pub controller: Arc<Controller>,
    /// Change feed produced by the Pod reflector
    pub events: mpsc::Receiver<ParentEvent>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Stops the reflector and the probe server once the controller returned
    pub background: CancellationToken,
    /// Pod watch task
    pub reflector: JoinHandle<()>,
    /// Probe server task
    pub server: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller", &self.controller)
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Pod reflector startup
/// - Controller construction
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoreplica_controller=info".into()),
        )
        .init();

    if !provider_installed {
        warn!("A rustls crypto provider was already installed, keeping it");
    }

    info!("Starting autoreplica controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::register_metrics()?;

    let config = ControllerConfig::from_env();
    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        workers = config.workers,
        replicas = config.replicas,
        max_retries = config.max_retries,
        "Loaded controller configuration"
    );

    let background = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());

    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_shutdown = background.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let pods: Api<Pod> = match config.namespace.as_deref() {
        Some(namespace) => {
            info!(namespace = namespace, "Watching Pods in namespace");
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching Pods in all namespaces");
            Api::all(client.clone())
        }
    };

    let (events_tx, events) = mpsc::channel(config.event_buffer);
    let (cache, reflector) = spawn_reflector(pods, events_tx, background.clone());

    let controller = Controller::new(
        config,
        Arc::new(cache),
        Arc::new(KubeReplicaSets::new(client)),
        Arc::new(TracingReporter),
    )
    .with_readiness(Arc::clone(&server_state.is_ready));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        controller: Arc::new(controller),
        events,
        server_state,
        background,
        reflector,
        server,
    })
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
