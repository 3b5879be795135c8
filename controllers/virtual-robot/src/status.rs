//! Status reporting for VirtualRobots.

use crate::error::ControllerError;
use crds::{VirtualRobot, VirtualRobotStatus};
use kube::ResourceExt;
use robot_client::RobotClusterTrait;
use tracing::debug;

/// Record `hostname` as `status.observedHostname`.
///
/// Only the status sub-resource is written; the spec is never touched.
/// Writing the same hostname again leaves the stored object unchanged.
pub async fn report_status(
    cluster: &dyn RobotClusterTrait,
    robot: &VirtualRobot,
    hostname: &str,
) -> Result<(), ControllerError> {
    let namespace = robot.namespace().unwrap_or_default();
    let status = VirtualRobotStatus {
        observed_hostname: Some(hostname.to_string()),
    };
    cluster
        .patch_virtual_robot_status(&namespace, &robot.name_any(), &status)
        .await
        .map_err(|source| ControllerError::StatusWrite {
            key: robot.key(),
            source,
        })?;
    debug!("Reported hostname {} for VirtualRobot {}", hostname, robot.key());
    Ok(())
}
