//! Controller-specific error types.
//!
//! This module defines the errors a VirtualRobot reconciliation can end
//! with. Every variant is returned to the work queue, which requeues the
//! object according to [`ControllerError::is_retryable`].

use kube::Error as KubeError;
use robot_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the VirtualRobot Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error outside of a reconciliation
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Reading the VirtualRobot failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// VirtualRobot spec cannot be turned into dependents
    #[error("Invalid VirtualRobot: {0}")]
    Validation(String),

    /// VirtualRobot has no name or uid yet, owner references cannot be built
    #[error("VirtualRobot identity not assigned: {0}")]
    MissingIdentity(String),

    /// Server-side apply of a dependent failed
    #[error("Failed to apply {kind} {namespace}/{name}: {source}")]
    Apply {
        /// Kind of the dependent
        kind: &'static str,
        /// Namespace of the dependent
        namespace: String,
        /// Name of the dependent
        name: String,
        /// Underlying API error
        #[source]
        source: ClusterError,
    },

    /// Writing `status.observedHostname` failed
    #[error("Failed to update status of VirtualRobot {key}: {source}")]
    StatusWrite {
        /// `namespace/name` of the VirtualRobot
        key: String,
        /// Underlying API error
        #[source]
        source: ClusterError,
    },

    /// Reconcile deadline elapsed
    #[error("Reconcile deadline exceeded: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether a retry can succeed without the user changing the VirtualRobot
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ControllerError::Validation(_) | ControllerError::InvalidConfig(_)
        )
    }
}
