//! Local object cache.
//!
//! `kube_runtime::watcher` reports raw `Apply`/`Delete` events and re-lists,
//! but never says what an object looked like before. The cache keeps the
//! last observed state of every ConfigMap in the namespace so each raw event
//! can be turned into an Added, Updated(previous, current) or Deleted
//! [`ChangeEvent`].

use k8s_openapi::api::core::v1::ConfigMap;
use kube_runtime::watcher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::warn;

/// Identity of a watched object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace, absent for objects the API server returned without one
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key of `obj`, or `None` when the object has no name.
    pub fn of(obj: &ConfigMap) -> Option<Self> {
        Some(Self {
            namespace: obj.metadata.namespace.clone(),
            name: obj.metadata.name.clone()?,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One notification handed to the dispatcher.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// First observation of an object.
    Added(ConfigMap),
    /// A later observation of a known object.
    Updated {
        /// Last state held in the cache
        previous: ConfigMap,
        /// State just delivered
        current: ConfigMap,
    },
    /// The object is gone; carries its last known state.
    Deleted(ConfigMap),
}

impl ChangeEvent {
    /// The object the event is about (the newest state for updates).
    pub fn object(&self) -> &ConfigMap {
        match self {
            ChangeEvent::Added(obj) | ChangeEvent::Deleted(obj) => obj,
            ChangeEvent::Updated { current, .. } => current,
        }
    }
}

/// Last observed state of every object in the watched namespace.
#[derive(Debug, Default)]
pub struct ObjectCache {
    objects: HashMap<ObjectKey, ConfigMap>,
    /// Keys seen since the last `Init`, while a (re)list is in progress.
    relisting: Option<HashSet<ObjectKey>>,
}

impl ObjectCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the cache holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Folds one raw watcher event into the cache.
    ///
    /// Returns the change events it implies, in delivery order. A re-list
    /// that completes without an object the cache still holds reports that
    /// object as deleted.
    pub fn apply(&mut self, event: watcher::Event<ConfigMap>) -> Vec<ChangeEvent> {
        match event {
            watcher::Event::Init => {
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let Some(key) = ObjectKey::of(&obj) else {
                    warn!("Skipping listed ConfigMap without a name");
                    return Vec::new();
                };
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(key.clone());
                }
                vec![self.upsert(key, obj)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };
                let vanished: Vec<ObjectKey> = self
                    .objects
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                vanished
                    .into_iter()
                    .filter_map(|key| self.objects.remove(&key))
                    .map(ChangeEvent::Deleted)
                    .collect()
            }
            watcher::Event::Apply(obj) => {
                let Some(key) = ObjectKey::of(&obj) else {
                    warn!("Skipping applied ConfigMap without a name");
                    return Vec::new();
                };
                vec![self.upsert(key, obj)]
            }
            watcher::Event::Delete(obj) => {
                let Some(key) = ObjectKey::of(&obj) else {
                    warn!("Skipping deleted ConfigMap without a name");
                    return Vec::new();
                };
                let last_known = self.objects.remove(&key).unwrap_or(obj);
                vec![ChangeEvent::Deleted(last_known)]
            }
        }
    }

    /// Replays every cached object as an update to itself.
    ///
    /// Used as a periodic safety net; the version check in the classifier
    /// filters these out unless a handler needs to see them.
    pub fn resync(&self) -> Vec<ChangeEvent> {
        self.objects
            .values()
            .map(|obj| ChangeEvent::Updated {
                previous: obj.clone(),
                current: obj.clone(),
            })
            .collect()
    }

    fn upsert(&mut self, key: ObjectKey, obj: ConfigMap) -> ChangeEvent {
        match self.objects.insert(key, obj.clone()) {
            Some(previous) => ChangeEvent::Updated {
                previous,
                current: obj,
            },
            None => ChangeEvent::Added(obj),
        }
    }
}
