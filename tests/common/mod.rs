//! Common test utilities for controller integration tests
//!
//! In-memory stand-ins for the Pod cache, the ReplicaSet API and the failure
//! reporter, plus Pod builders.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use autoreplica_controller::prelude::*;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Pod with an `app` label and a single container
pub fn parent_pod(namespace: &str, name: &str, app: &str, image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            resource_version: Some("1".to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "web".to_string(),
                image: Some(image.to_string()),
                ..Container::default()
            }],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

pub fn coffee() -> Pod {
    parent_pod("default", "coffee", "coffee", "coffee:1.0")
}

/// Fast, capped backoff for tests
pub fn test_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(80))
}

/// Pod cache backed by a map
#[derive(Debug, Default)]
pub struct MemoryCache {
    pods: RwLock<HashMap<(String, String), Arc<Pod>>>,
    synced: AtomicBool,
}

impl MemoryCache {
    pub fn synced_with(pods: &[Pod]) -> Arc<Self> {
        let cache = Arc::new(Self::default());
        for pod in pods {
            cache.insert(pod.clone());
        }
        cache.set_synced(true);
        cache
    }

    pub fn insert(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.pods.write().unwrap().insert(key, Arc::new(pod));
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.pods
            .write()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }
}

impl ParentCache for MemoryCache {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        self.pods
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// ReplicaSet store that behaves like the API server unless scripted otherwise
///
/// Scripted errors are returned in order, one per call. Once the script is
/// exhausted, a create succeeds the first time and reports `AlreadyExists`
/// afterwards.
#[derive(Debug, Default)]
pub struct FakeChildStore {
    script: Mutex<VecDeque<CreateChildError>>,
    children: Mutex<BTreeMap<String, ReplicaSet>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_child: AtomicUsize,
}

impl FakeChildStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_with(errors: Vec<CreateChildError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(errors.into()),
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn children(&self) -> BTreeMap<String, ReplicaSet> {
        self.children.lock().unwrap().clone()
    }

    pub fn child(&self, namespace: &str, name: &str) -> Option<ReplicaSet> {
        self.children
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }

    /// Highest number of concurrent creates seen for any single child
    pub fn max_active_per_child(&self) -> usize {
        self.max_active_per_child.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a> {
    store: &'a FakeChildStore,
    key: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Some(count) = self.store.active.lock().unwrap().get_mut(&self.key) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl ChildStore for FakeChildStore {
    async fn create_child(
        &self,
        namespace: &str,
        child: &ReplicaSet,
    ) -> Result<ReplicaSet, CreateChildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = format!(
            "{namespace}/{}",
            child.metadata.name.as_deref().unwrap_or_default()
        );

        let _guard = {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(key.clone()).or_insert(0);
            *count += 1;
            self.max_active_per_child.fetch_max(*count, Ordering::SeqCst);
            ActiveGuard {
                store: self,
                key: key.clone(),
            }
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut children = self.children.lock().unwrap();
        if children.contains_key(&key) {
            return Err(CreateChildError::AlreadyExists(format!(
                "replicasets.apps \"{key}\" already exists"
            )));
        }
        children.insert(key, child.clone());
        Ok(child.clone())
    }
}

/// Failure reporter that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub dropped: Mutex<Vec<(WorkKey, u32, String)>>,
    pub abandoned: Mutex<Vec<(WorkKey, String)>>,
    pub startup_failures: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dropped(&self) -> Vec<(WorkKey, u32, String)> {
        self.dropped.lock().unwrap().clone()
    }

    pub fn abandoned(&self) -> Vec<(WorkKey, String)> {
        self.abandoned.lock().unwrap().clone()
    }

    pub fn startup_failures(&self) -> Vec<String> {
        self.startup_failures.lock().unwrap().clone()
    }
}

impl FailureReporter for RecordingReporter {
    fn report_dropped(&self, key: &WorkKey, attempts: u32, error: &str) {
        self.dropped
            .lock()
            .unwrap()
            .push((key.clone(), attempts, error.to_string()));
    }

    fn report_abandoned(&self, key: &WorkKey, error: &str) {
        self.abandoned
            .lock()
            .unwrap()
            .push((key.clone(), error.to_string()));
    }

    fn report_startup_failure(&self, error: &str) {
        self.startup_failures.lock().unwrap().push(error.to_string());
    }
}

/// Reconciler over the given fakes with a queue reporting to `reporter`
pub fn reconciler(
    cache: Arc<MemoryCache>,
    store: Arc<FakeChildStore>,
    reporter: Arc<RecordingReporter>,
    max_retries: u32,
) -> Reconciler {
    let queue = KeyQueue::new(test_backoff(), max_retries, reporter);
    Reconciler::new(
        cache,
        store,
        queue,
        ReconcilePolicy {
            replicas: 3,
            drop_terminal_errors: false,
            sync_timeout: None,
        },
    )
}
