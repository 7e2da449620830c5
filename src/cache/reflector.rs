//! # Reflector Cache
//!
//! [`ParentCache`] backed by a `kube_runtime` reflector store.
//!
//! A watcher populates the store; before each watcher event is applied it is
//! diffed against the store's previous contents to produce typed
//! [`ParentEvent`]s for the change feed:
//!
//! - `Apply`/`InitApply` of an unknown object: `Added`
//! - `Apply`/`InitApply` of a known object: `Updated { old, new }`
//! - `Delete`: `Deleted`
//! - objects known before a relist but missing from it: `Deleted` at `InitDone`
//!
//! Changes wait in a local backlog until the channel accepts them, so a slow
//! consumer never holds up the store or the synced flag.

use super::{ParentCache, ParentEvent};
use futures::{pin_mut, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube_runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Previously observed cache contents
pub trait Snapshot {
    fn lookup(&self, key: &ObjectRef<Pod>) -> Option<Arc<Pod>>;
    fn all(&self) -> Vec<Arc<Pod>>;
}

impl Snapshot for Store<Pod> {
    fn lookup(&self, key: &ObjectRef<Pod>) -> Option<Arc<Pod>> {
        self.get(key)
    }

    fn all(&self) -> Vec<Arc<Pod>> {
        self.state()
    }
}

impl Snapshot for HashMap<ObjectRef<Pod>, Arc<Pod>> {
    fn lookup(&self, key: &ObjectRef<Pod>) -> Option<Arc<Pod>> {
        self.get(key).cloned()
    }

    fn all(&self) -> Vec<Arc<Pod>> {
        self.values().cloned().collect()
    }
}

/// Turns raw watcher events into typed change notifications
#[derive(Debug, Default)]
pub struct FeedDiff {
    /// Objects known before the current relist and not yet listed again
    unseen: Option<HashMap<ObjectRef<Pod>, Arc<Pod>>>,
}

impl FeedDiff {
    /// Diff one watcher event against the snapshot taken before applying it
    pub fn observe<S>(&mut self, event: &watcher::Event<Pod>, previous: &S) -> Vec<ParentEvent>
    where
        S: Snapshot + ?Sized,
    {
        match event {
            watcher::Event::Apply(pod) => vec![applied(pod, previous)],
            watcher::Event::Delete(pod) => vec![ParentEvent::Deleted(Arc::new(pod.clone()))],
            watcher::Event::Init => {
                self.unseen = Some(
                    previous
                        .all()
                        .into_iter()
                        .map(|pod| (ObjectRef::from_obj(pod.as_ref()), pod))
                        .collect(),
                );
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                if let Some(unseen) = self.unseen.as_mut() {
                    unseen.remove(&ObjectRef::from_obj(pod));
                }
                vec![applied(pod, previous)]
            }
            watcher::Event::InitDone => self
                .unseen
                .take()
                .map(|unseen| unseen.into_values().map(ParentEvent::Deleted).collect())
                .unwrap_or_default(),
        }
    }
}

fn applied<S>(pod: &Pod, previous: &S) -> ParentEvent
where
    S: Snapshot + ?Sized,
{
    let new = Arc::new(pod.clone());
    match previous.lookup(&ObjectRef::from_obj(pod)) {
        Some(old) => ParentEvent::Updated { old, new },
        None => ParentEvent::Added(new),
    }
}

/// Read handle onto the reflector store
#[derive(Clone)]
pub struct ReflectorCache {
    store: Store<Pod>,
    synced: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReflectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectorCache")
            .field("objects", &self.store.len())
            .field("synced", &self.synced())
            .finish()
    }
}

impl ParentCache for ReflectorCache {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Start watching Pods and feeding the change channel
///
/// Returns the cache handle and the feed task. The task ends when `shutdown`
/// fires, the watch stream ends, or the receiving side of `events` is dropped.
pub fn spawn_reflector(
    api: Api<Pod>,
    events: mpsc::Sender<ParentEvent>,
    shutdown: CancellationToken,
) -> (ReflectorCache, JoinHandle<()>) {
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    spawn_feed(stream, events, shutdown)
}

/// Mirror an arbitrary watcher event stream into a fresh store
///
/// The stream keeps being polled while the change channel is full, so the
/// store and the synced flag never wait on the consumer.
pub fn spawn_feed<S>(
    stream: S,
    events: mpsc::Sender<ParentEvent>,
    shutdown: CancellationToken,
) -> (ReflectorCache, JoinHandle<()>)
where
    S: Stream<Item = Result<watcher::Event<Pod>, watcher::Error>> + Send + 'static,
{
    let (reader, writer) = reflector::store::<Pod>();
    let synced = Arc::new(AtomicBool::new(false));
    let cache = ReflectorCache {
        store: reader.clone(),
        synced: Arc::clone(&synced),
    };
    let handle = tokio::spawn(run_feed(stream, reader, writer, synced, events, shutdown));
    (cache, handle)
}

async fn run_feed<S>(
    stream: S,
    reader: Store<Pod>,
    mut writer: Writer<Pod>,
    synced: Arc<AtomicBool>,
    events: mpsc::Sender<ParentEvent>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = Result<watcher::Event<Pod>, watcher::Error>>,
{
    pin_mut!(stream);
    let mut diff = FeedDiff::default();
    // Changes the channel has not accepted yet
    let mut backlog: VecDeque<ParentEvent> = VecDeque::new();
    let mut watching = true;

    info!("Starting Pod watch...");

    while watching || !backlog.is_empty() {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = events.closed() => {
                debug!("Change feed receiver dropped, stopping Pod watch");
                return;
            }
            permit = events.reserve(), if !backlog.is_empty() => {
                let Ok(permit) = permit else {
                    debug!("Change feed receiver dropped, stopping Pod watch");
                    return;
                };
                if let Some(change) = backlog.pop_front() {
                    permit.send(change);
                }
            }
            next = stream.next(), if watching => match next {
                Some(Ok(event)) => {
                    backlog.extend(diff.observe(&event, &reader));
                    writer.apply_watcher_event(&event);
                    if matches!(event, watcher::Event::InitDone)
                        && !synced.swap(true, Ordering::AcqRel)
                    {
                        info!(
                            objects = reader.len(),
                            backlog = backlog.len(),
                            "Pod cache synced"
                        );
                    }
                }
                Some(Err(e)) => {
                    // default_backoff() delays the next poll, the watcher restarts itself
                    warn!(error = %e, "Pod watch error, retrying with backoff");
                }
                None => {
                    warn!("Pod watch stream ended");
                    watching = false;
                }
            },
        }
    }

    info!("Pod watch stopped");
}
