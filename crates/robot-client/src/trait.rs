//! RobotClusterTrait for mocking
//!
//! This trait abstracts the Kubernetes API so the reconciler can be
//! exercised in unit tests against an in-memory cluster.

use crate::error::ClusterError;
use crds::{VirtualRobot, VirtualRobotStatus};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;

/// Trait for Kubernetes API operations used by the VirtualRobot controller
///
/// All writes to generated objects are server-side applies with forced
/// ownership under [`RobotClusterTrait::field_manager`]. All async methods
/// must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait RobotClusterTrait: Send + Sync {
    /// Field manager identity recorded for every apply
    fn field_manager(&self) -> &str;

    /// Fetch a VirtualRobot, `Ok(None)` if it does not exist
    async fn get_virtual_robot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualRobot>, ClusterError>;

    // Server-side apply of generated objects
    async fn apply_pod(&self, pod: &Pod) -> Result<Pod, ClusterError>;
    async fn apply_service(&self, service: &Service) -> Result<Service, ClusterError>;
    async fn apply_ingress(&self, ingress: &Ingress) -> Result<Ingress, ClusterError>;

    /// Merge-patch the status sub-resource of a VirtualRobot
    async fn patch_virtual_robot_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualRobotStatus,
    ) -> Result<(), ClusterError>;
}
