//! Controller-specific error types.
//!
//! This module defines error types specific to the Thanos reloader
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use reload_client::ReloadError;
use thiserror::Error;

/// Errors that can occur in the Thanos reloader.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Neither the kubeconfig file nor in-cluster credentials were usable
    #[error("Cannot get a kubeconfig: {0}")]
    Credentials(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reload client could not be built
    #[error("Reload client error: {0}")]
    Reload(#[from] ReloadError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
