//! # Desired State
//!
//! Pure synthesis of the child ReplicaSet for a parent Pod.
//!
//! The child is named `<pod>-rs`, lives in the Pod's namespace, selects on the
//! Pod's `app` label and runs a single container copied from the Pod's first
//! container. Nothing here performs I/O or reads ambient state, so the same Pod
//! always yields an equal ReplicaSet.

use crate::constants::{APP_LABEL, CHILD_NAME_SUFFIX};
use k8s_openapi::api::apps::v1::{ReplicaSet, ReplicaSetSpec};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Reasons a Pod cannot be turned into a child
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("parent has no name")]
    MissingName,
    #[error("parent {0} has no namespace")]
    MissingNamespace(String),
    #[error("parent {0} has no pod spec")]
    MissingSpec(String),
    #[error("parent {0} has no containers")]
    NoContainers(String),
    #[error("first container '{container}' of parent {parent} has no image")]
    MissingImage { parent: String, container: String },
    #[error("parent {0} has no 'app' label")]
    MissingAppLabel(String),
}

/// Name of the child created for a parent
pub fn child_name(parent_name: &str) -> String {
    format!("{parent_name}{CHILD_NAME_SUFFIX}")
}

/// Build the ReplicaSet a Pod should produce
///
/// # Errors
///
/// Returns a [`SynthesisError`] when the Pod lacks a name, namespace, spec,
/// containers, a first-container image, or a non-empty `app` label.
pub fn desired_replica_set(parent: &Pod, replicas: i32) -> Result<ReplicaSet, SynthesisError> {
    let name = parent
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(SynthesisError::MissingName)?;
    let namespace = parent
        .metadata
        .namespace
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SynthesisError::MissingNamespace(name.to_string()))?;
    let qualified = format!("{namespace}/{name}");

    let app = parent
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(APP_LABEL))
        .filter(|app| !app.is_empty())
        .ok_or_else(|| SynthesisError::MissingAppLabel(qualified.clone()))?;

    let spec = parent
        .spec
        .as_ref()
        .ok_or_else(|| SynthesisError::MissingSpec(qualified.clone()))?;
    let first = spec
        .containers
        .first()
        .ok_or_else(|| SynthesisError::NoContainers(qualified.clone()))?;
    let image = first
        .image
        .as_deref()
        .filter(|image| !image.is_empty())
        .ok_or_else(|| SynthesisError::MissingImage {
            parent: qualified.clone(),
            container: first.name.clone(),
        })?;

    let app_labels = BTreeMap::from([(APP_LABEL.to_string(), app.clone())]);

    Ok(ReplicaSet {
        metadata: ObjectMeta {
            name: Some(child_name(name)),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ReplicaSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(app_labels.clone()),
                ..LabelSelector::default()
            },
            template: Some(PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: first.name.clone(),
                        image: Some(image.to_string()),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            }),
            ..ReplicaSetSpec::default()
        }),
        ..ReplicaSet::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coffee_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("coffee".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "coffee".to_string()),
                    ("tier".to_string(), "web".to_string()),
                ])),
                resource_version: Some("42".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "web".to_string(),
                        image: Some("coffee:1.0".to_string()),
                        ..Container::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        image: Some("proxy:2".to_string()),
                        ..Container::default()
                    },
                ],
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn test_child_copies_name_selector_and_first_container() {
        let rs = desired_replica_set(&coffee_pod(), 3).unwrap();

        assert_eq!(rs.metadata.name.as_deref(), Some("coffee-rs"));
        assert_eq!(rs.metadata.namespace.as_deref(), Some("default"));

        let spec = rs.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(
            spec.selector.match_labels,
            Some(BTreeMap::from([("app".to_string(), "coffee".to_string())]))
        );

        let template = spec.template.unwrap();
        assert_eq!(
            template.metadata.unwrap().labels,
            Some(BTreeMap::from([("app".to_string(), "coffee".to_string())]))
        );
        let containers = template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "web");
        assert_eq!(containers[0].image.as_deref(), Some("coffee:1.0"));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let pod = coffee_pod();
        assert_eq!(
            desired_replica_set(&pod, 3).unwrap(),
            desired_replica_set(&pod, 3).unwrap()
        );
        assert_eq!(
            serde_json::to_vec(&desired_replica_set(&pod, 3).unwrap()).unwrap(),
            serde_json::to_vec(&desired_replica_set(&pod, 3).unwrap()).unwrap()
        );
    }

    #[test]
    fn test_resource_version_does_not_leak_into_child() {
        let mut newer = coffee_pod();
        newer.metadata.resource_version = Some("43".to_string());
        assert_eq!(
            desired_replica_set(&coffee_pod(), 3).unwrap(),
            desired_replica_set(&newer, 3).unwrap()
        );
    }

    #[test]
    fn test_replica_policy_is_applied() {
        let rs = desired_replica_set(&coffee_pod(), 5).unwrap();
        assert_eq!(rs.spec.unwrap().replicas, Some(5));
    }

    #[test]
    fn test_empty_container_list_is_rejected() {
        let mut pod = coffee_pod();
        pod.spec.as_mut().unwrap().containers.clear();
        assert_eq!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::NoContainers("default/coffee".to_string()))
        );
    }

    #[test]
    fn test_missing_spec_is_rejected() {
        let mut pod = coffee_pod();
        pod.spec = None;
        assert!(matches!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::MissingSpec(_))
        ));
    }

    #[test]
    fn test_missing_app_label_is_rejected() {
        let mut pod = coffee_pod();
        pod.metadata.labels.as_mut().unwrap().remove("app");
        assert_eq!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::MissingAppLabel("default/coffee".to_string()))
        );

        pod.metadata.labels = None;
        assert!(matches!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::MissingAppLabel(_))
        ));
    }

    #[test]
    fn test_missing_image_is_rejected() {
        let mut pod = coffee_pod();
        pod.spec.as_mut().unwrap().containers[0].image = None;
        assert_eq!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::MissingImage {
                parent: "default/coffee".to_string(),
                container: "web".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let mut pod = coffee_pod();
        pod.metadata.namespace = None;
        assert!(matches!(
            desired_replica_set(&pod, 3),
            Err(SynthesisError::MissingNamespace(_))
        ));

        pod.metadata.name = None;
        assert_eq!(desired_replica_set(&pod, 3), Err(SynthesisError::MissingName));
    }
}
