//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the reconciler and the watcher together.

use crate::FIELD_MANAGER;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use kube::Client;
use robot_client::RobotCluster;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for VirtualRobot management.
#[derive(Debug)]
pub struct Controller {
    robot_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing VirtualRobot Controller");

        let kube_client = Client::try_default().await?;

        let cluster = RobotCluster::new(kube_client.clone(), FIELD_MANAGER);
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(cluster),
            config.route_settings.clone(),
            config.reconcile_timeout,
        ));

        let watcher = Watcher::new(
            reconciler,
            &kube_client,
            config.namespace.as_deref(),
            config.concurrency,
        );
        let robot_watcher = tokio::spawn(watcher.run());

        Ok(Self { robot_watcher })
    }

    /// Runs the controller until the watcher exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("VirtualRobot Controller running");

        self.robot_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("VirtualRobot watcher panicked: {}", e)))?
            .map_err(|e| {
                error!("VirtualRobot watcher error: {}", e);
                ControllerError::Watch(format!("VirtualRobot watcher error: {}", e))
            })
    }
}
