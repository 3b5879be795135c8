//! VirtualRobot Controller
//!
//! Materializes every VirtualRobot as:
//! - a Pod running the robot websocket server
//! - a Service selecting that Pod by the VirtualRobot's uid
//! - a TLS Ingress at `<robotName>.<baseDomain>` with a cert-manager certificate
//!
//! and reports the host in `status.observedHostname` once all three exist.

mod apply;
mod backoff;
mod builders;
mod config;
mod controller;
mod deadline;
mod error;
mod ownership;
mod reconciler;
mod status;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Field manager recorded for every server-side apply and status write
pub const FIELD_MANAGER: &str = "virtualrobot";

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(provider) =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
    {
        debug!(?provider, "CryptoProvider already installed; proceeding");
    }

    info!("Starting VirtualRobot Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Reconcile timeout: {}s", config.reconcile_timeout.as_secs());
    info!("  Ingress class: {}", config.route_settings.ingress_class);
    info!("  Cluster issuer: {}", config.route_settings.cluster_issuer);
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
