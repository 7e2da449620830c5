//! # Kubernetes ReplicaSet Store
//!
//! Creates children through the Kubernetes API and maps API failures onto
//! [`CreateChildError`].

use super::{ChildStore, CreateChildError};
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;
use kube::api::{Api, PostParams};
use kube::Client;
use std::time::Instant;
use tracing::debug;

/// [`ChildStore`] backed by the `apps/v1` ReplicaSet API
#[derive(Clone)]
pub struct KubeReplicaSets {
    client: Client,
}

impl std::fmt::Debug for KubeReplicaSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeReplicaSets").finish_non_exhaustive()
    }
}

impl KubeReplicaSets {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChildStore for KubeReplicaSets {
    async fn create_child(
        &self,
        namespace: &str,
        child: &ReplicaSet,
    ) -> Result<ReplicaSet, CreateChildError> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let start = Instant::now();
        let result = api.create(&PostParams::default(), child).await;
        metrics::observe_create_duration(start.elapsed().as_secs_f64());

        result.map_err(|e| {
            let classified = classify_kube_error(&e);
            debug!(
                namespace = namespace,
                child = child.metadata.name.as_deref().unwrap_or("unknown"),
                kind = classified.kind(),
                "provider.create_child.failed"
            );
            classified
        })
    }
}

/// Classify a client error into a [`CreateChildError`]
pub fn classify_kube_error(error: &kube::Error) -> CreateChildError {
    let message = error.to_string();
    match error {
        kube::Error::Api(api_err) => classify_status_code(api_err.code, message),
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => {
            CreateChildError::Transient(message)
        }
        _ => CreateChildError::Unknown(message),
    }
}

/// Classify an API status code returned by a create call
///
/// A create only conflicts when the name is taken, so 409 means the child
/// already exists.
pub fn classify_status_code(code: u16, message: String) -> CreateChildError {
    match code {
        409 => CreateChildError::AlreadyExists(message),
        401 | 403 => CreateChildError::Unauthorized(message),
        400 | 422 => CreateChildError::Invalid(message),
        408 | 429 | 500 | 502 | 503 | 504 => CreateChildError::Transient(message),
        _ => CreateChildError::Unknown(message),
    }
}
