//! # Provider Modules
//!
//! The remote object store the controller writes children into.
//!
//! Implementations classify every failure into a [`CreateChildError`] so the
//! reconciler can tell an idempotent "already exists" apart from real errors.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;

pub mod kubernetes;

pub use kubernetes::KubeReplicaSets;

/// Classified failure of a child create call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateChildError {
    /// The child already exists; the desired state is realized
    #[error("child already exists: {0}")]
    AlreadyExists(String),
    /// Credentials were rejected or lack permission
    #[error("not authorized to create child: {0}")]
    Unauthorized(String),
    /// The store rejected the child as invalid
    #[error("child rejected as invalid: {0}")]
    Invalid(String),
    /// Network failure, throttling or a temporarily unavailable store
    #[error("transient failure creating child: {0}")]
    Transient(String),
    #[error("unexpected failure creating child: {0}")]
    Unknown(String),
}

impl CreateChildError {
    /// Errors that retrying with the same input will not fix
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Invalid(_))
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "already_exists",
            Self::Unauthorized(_) => "unauthorized",
            Self::Invalid(_) => "invalid",
            Self::Transient(_) => "transient",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Remote store that children are created in
#[async_trait]
pub trait ChildStore: Send + Sync {
    /// Create a child in `namespace`, returning the stored object
    async fn create_child(
        &self,
        namespace: &str,
        child: &ReplicaSet,
    ) -> Result<ReplicaSet, CreateChildError>;
}
