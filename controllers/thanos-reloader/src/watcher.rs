//! Kubernetes resource watcher.
//!
//! The dispatcher consumes the ConfigMap watch stream, folds it through the
//! [`ObjectCache`], classifies every resulting change and queues a reload for
//! the relevant ones. It never waits on a reload itself, so the stream keeps
//! flowing while the ruler is being signalled.

use crate::classifier::{ChangeClassifier, Classification};
use crate::error::ControllerError;
use crate::state::{Phase, StatusBoard};
use crate::store::{ChangeEvent, ObjectCache, ObjectKey};
use crate::trigger::{Enqueued, ReloadQueue, ReloadRequest};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube_runtime::watcher;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Interval at which cached objects are replayed through the classifier.
pub const RESYNC_PERIOD: Duration = Duration::from_secs(45);

/// Routes watch events to the classifier and the reload queue.
#[derive(Debug)]
pub struct Dispatcher {
    classifier: ChangeClassifier,
    queue: ReloadQueue,
    status: StatusBoard,
    cache: ObjectCache,
    resync_period: Duration,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(classifier: ChangeClassifier, queue: ReloadQueue, status: StatusBoard) -> Self {
        Self {
            classifier,
            queue,
            status,
            cache: ObjectCache::new(),
            resync_period: RESYNC_PERIOD,
        }
    }

    /// Runs until `shutdown` fires or its sender is dropped.
    ///
    /// Returns an error only if the watch stream itself ends, which a
    /// `kube_runtime` watcher with backoff never does on its own.
    pub async fn run<S>(mut self, events: S, mut shutdown: oneshot::Receiver<()>) -> Result<(), ControllerError>
    where
        S: Stream<Item = Result<watcher::Event<ConfigMap>, watcher::Error>> + Send,
    {
        info!("Starting ConfigMap watcher for {}", self.classifier.selector());
        self.status.set_phase(Phase::Syncing);

        let mut stream = Box::pin(events);
        let mut resync = tokio::time::interval_at(Instant::now() + self.resync_period, self.resync_period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping ConfigMap watcher");
                    break Ok(());
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.on_watch_event(event),
                    Some(Err(e)) => {
                        // Includes objects that failed to deserialize
                        warn!("ConfigMap watch error (stream will retry): {}", e);
                    }
                    None => {
                        error!("ConfigMap watch stream ended");
                        break Err(ControllerError::Watch("watch stream ended".to_string()));
                    }
                },
                _ = resync.tick() => self.resync(),
            }
        };

        self.status.set_phase(Phase::Stopped);
        result
    }

    fn on_watch_event(&mut self, event: watcher::Event<ConfigMap>) {
        let initial_sync_done = matches!(event, watcher::Event::InitDone) && self.status.phase() == Phase::Syncing;

        match &event {
            watcher::Event::Init => debug!("ConfigMap list started"),
            watcher::Event::InitDone => debug!("ConfigMap list complete ({} objects cached)", self.cache.len()),
            _ => {}
        }

        for change in self.cache.apply(event) {
            self.dispatch(change);
        }

        if initial_sync_done {
            self.status.set_phase(Phase::Watching);
            info!("ConfigMap cache synced, watching for changes");
        }
    }

    fn resync(&mut self) {
        if self.status.phase() != Phase::Watching {
            return;
        }
        trace!("Resyncing {} cached ConfigMaps", self.cache.len());
        for change in self.cache.resync() {
            self.dispatch(change);
        }
    }

    /// Classifies one change and queues a reload if it is relevant.
    pub fn dispatch(&self, change: ChangeEvent) {
        let (classification, what) = match &change {
            ChangeEvent::Added(obj) => (self.classifier.classify_added(obj), "created"),
            ChangeEvent::Updated { previous, current } => {
                (self.classifier.classify_updated(previous, current), "changed")
            }
            ChangeEvent::Deleted(obj) => {
                // Deleting the rules ConfigMap leaves the ruler on its last config
                debug!("Ignoring deletion of ConfigMap {}", describe(obj));
                return;
            }
        };

        let obj = change.object();
        match classification {
            Classification::Relevant => {
                info!("Thanos ruler ConfigMap {} {}", describe(obj), what);
                self.enqueue(obj);
            }
            Classification::Malformed(reason) => {
                warn!("Skipping malformed ConfigMap event for {}: {}", describe(obj), reason);
            }
            other => trace!("ConfigMap {} not relevant: {}", describe(obj), other),
        }
    }

    fn enqueue(&self, obj: &ConfigMap) {
        let Some(object) = ObjectKey::of(obj) else {
            warn!("Skipping reload for relevant ConfigMap without a name");
            return;
        };
        let request = ReloadRequest {
            object,
            resource_version: obj.metadata.resource_version.clone(),
        };
        match self.queue.request(request) {
            Enqueued::Queued => debug!("Reload queued"),
            Enqueued::Coalesced => debug!("Reload already pending, coalesced"),
            Enqueued::Closed => error!("Reload worker is gone, dropping reload request"),
        }
    }
}

fn describe(obj: &ConfigMap) -> String {
    ObjectKey::of(obj).map_or_else(|| "<unnamed>".to_string(), |key| key.to_string())
}
