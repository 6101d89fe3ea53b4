//! Test utilities for unit testing the reloader
//!
//! Helpers for building ConfigMaps and watch events.

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Namespace used by every test object
pub const TEST_NAMESPACE: &str = "monitoring";

/// Helper to create a labelled test ConfigMap
pub fn create_test_configmap(name: &str, labels: &[(&str, &str)], resource_version: &str) -> ConfigMap {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(labels),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create a test ConfigMap with no labels at all
pub fn create_unlabeled_configmap(name: &str, resource_version: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create the Thanos rules ConfigMap at a given version
pub fn create_rules_configmap(resource_version: &str) -> ConfigMap {
    create_test_configmap("thanos-ruler-rules", &[("name", "thanos-rules")], resource_version)
}
