//! Thanos Reloader
//!
//! Signals the Thanos ruler to reload whenever its rules ConfigMap changes.

use clap::Parser;
use thanos_reloader::config::{LogFormat, Settings};
use thanos_reloader::{Controller, ControllerError};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let settings = Settings::parse();
    init_tracing(settings.log_format);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting Thanos reloader");
    settings.validate()?;

    info!("Configuration:");
    info!("  Kubeconfig: {}", settings.kube_config_file.display());
    info!("  Namespace: {}", settings.namespace);
    info!("  Reload URL: {}", settings.reload_url);

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Termination signal received");
        let _ = stop_tx.send(());
    });

    // Initialize and run controller
    let controller = match Controller::new(&settings, stop_rx).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to start Thanos reloader: {}", e);
            return Err(e);
        }
    };

    let mut state = controller.state();
    tokio::spawn(async move {
        if state.ready().await {
            info!("Thanos reloader ready");
        }
    });

    controller.run().await?;

    info!("Thanos reloader stopped");
    Ok(())
}
