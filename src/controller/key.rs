//! # Work Keys
//!
//! `namespace/name` identities used to deduplicate pending reconciliations.

use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use std::str::FromStr;

/// Identity of a pending reconciliation unit
///
/// Renders as `"<namespace>/<name>"`. Keys are cheap to clone and hash, and the
/// queue uses them as its deduplication unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkKey {
    namespace: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("work key '{0}' is not of the form <namespace>/<name>")]
    Malformed(String),
}

impl WorkKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a cached object, if it carries both a namespace and a name
    pub fn for_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.as_deref().filter(|n| !n.is_empty())?;
        let namespace = pod.metadata.namespace.as_deref().filter(|n| !n.is_empty())?;
        Some(Self::new(namespace, name))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for WorkKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(KeyParseError::Malformed(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_key_round_trips_through_display() {
        let key = WorkKey::new("default", "coffee");
        assert_eq!(key.to_string(), "default/coffee");
        assert_eq!("default/coffee".parse::<WorkKey>(), Ok(key));
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        for raw in ["coffee", "/coffee", "default/", "a/b/c", ""] {
            assert!(
                raw.parse::<WorkKey>().is_err(),
                "'{raw}' should not parse as a work key"
            );
        }
    }

    #[test]
    fn test_for_pod_requires_namespace_and_name() {
        let mut pod = Pod {
            metadata: ObjectMeta {
                name: Some("coffee".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        };
        assert_eq!(
            WorkKey::for_pod(&pod),
            Some(WorkKey::new("default", "coffee"))
        );

        pod.metadata.namespace = None;
        assert_eq!(WorkKey::for_pod(&pod), None);
    }
}
