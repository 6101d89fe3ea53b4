//! Change classification.
//!
//! Decides whether an observed `ConfigMap` change concerns the Thanos rules
//! configuration. The decision looks at one label on the newest object and,
//! for updates, at the resource versions of both observations. Nothing else
//! about the object is consulted.

use k8s_openapi::api::core::v1::ConfigMap;
use std::fmt;

/// Label key carried by the rules ConfigMap.
pub const TARGET_LABEL_KEY: &str = "name";

/// Value of [`TARGET_LABEL_KEY`] that marks the rules ConfigMap.
pub const TARGET_LABEL_VALUE: &str = "thanos-rules";

/// Outcome of classifying a single change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The change concerns the rules configuration.
    Relevant,
    /// Both observations carry the same resource version.
    Unchanged,
    /// The object carries no labels at all.
    Unlabeled,
    /// The target label is absent or holds another value.
    LabelMismatch,
    /// The payload lacks something needed to decide.
    Malformed(String),
}

impl Classification {
    /// Whether a reload should be triggered.
    pub fn is_relevant(&self) -> bool {
        matches!(self, Classification::Relevant)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Relevant => write!(f, "relevant"),
            Classification::Unchanged => write!(f, "unchanged resource version"),
            Classification::Unlabeled => write!(f, "no labels"),
            Classification::LabelMismatch => write!(f, "label mismatch"),
            Classification::Malformed(reason) => write!(f, "malformed: {reason}"),
        }
    }
}

/// Label-based relevance check for ConfigMap events.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    label_key: String,
    label_value: String,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new(TARGET_LABEL_KEY, TARGET_LABEL_VALUE)
    }
}

impl ChangeClassifier {
    /// Creates a classifier matching `label_key == label_value`.
    pub fn new(label_key: impl Into<String>, label_value: impl Into<String>) -> Self {
        Self {
            label_key: label_key.into(),
            label_value: label_value.into(),
        }
    }

    /// The `key=value` selector this classifier matches.
    pub fn selector(&self) -> String {
        format!("{}={}", self.label_key, self.label_value)
    }

    /// Classifies a newly observed object.
    pub fn classify_added(&self, obj: &ConfigMap) -> Classification {
        self.classify_labels(obj)
    }

    /// Classifies an update from `previous` to `current`.
    ///
    /// Redelivery of identical state (same resource version) is never a
    /// change. A version missing on one side compares as empty, so it counts
    /// as a change; with neither side versioned the pair is malformed.
    /// Relevance is decided on `current` only.
    pub fn classify_updated(&self, previous: &ConfigMap, current: &ConfigMap) -> Classification {
        let old_version = previous.metadata.resource_version.as_deref();
        let new_version = current.metadata.resource_version.as_deref();

        if old_version.is_none() && new_version.is_none() {
            return Classification::Malformed("update without resource version".to_string());
        }

        if old_version.unwrap_or_default() == new_version.unwrap_or_default() {
            return Classification::Unchanged;
        }

        self.classify_labels(current)
    }

    /// Boolean form of [`Self::classify_added`].
    pub fn is_relevant_add(&self, obj: &ConfigMap) -> bool {
        self.classify_added(obj).is_relevant()
    }

    /// Boolean form of [`Self::classify_updated`].
    pub fn is_relevant_update(&self, previous: &ConfigMap, current: &ConfigMap) -> bool {
        self.classify_updated(previous, current).is_relevant()
    }

    fn classify_labels(&self, obj: &ConfigMap) -> Classification {
        let Some(labels) = obj.metadata.labels.as_ref() else {
            return Classification::Unlabeled;
        };

        match labels.get(&self.label_key) {
            Some(value) if *value == self.label_value => Classification::Relevant,
            _ => Classification::LabelMismatch,
        }
    }
}
