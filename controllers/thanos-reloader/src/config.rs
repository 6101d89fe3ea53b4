//! Command line and environment settings.

use crate::error::ControllerError;
use clap::{Parser, ValueEnum};
use reload_client::DEFAULT_RELOAD_URL;
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Thanos reloader settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "thanos-reloader")]
#[command(about = "Signals the Thanos ruler to reload when its rules ConfigMap changes", long_about = None)]
pub struct Settings {
    /// Kubernetes config file path; in-cluster credentials are used if it is unusable
    #[arg(long = "kubeConfigFile", default_value = "/root/.kube/config")]
    pub kube_config_file: PathBuf,

    /// Namespace whose ConfigMaps are watched
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "monitoring")]
    pub namespace: String,

    /// Reload endpoint of the Thanos ruler
    #[arg(long, env = "RELOAD_URL", default_value = DEFAULT_RELOAD_URL)]
    pub reload_url: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Rejects settings that cannot work.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.namespace.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
