//! Owner references from generated objects back to their VirtualRobot.
//!
//! Every dependent carries exactly one controller owner reference, so the
//! cluster garbage collector removes it once the VirtualRobot is deleted.

use crate::builders::DesiredState;
use crate::error::ControllerError;
use crds::VirtualRobot;
use kube::{Resource, ResourceExt};

/// Set `robot` as the sole controlling owner of `dependent`
pub fn attach_owner<K: Resource>(
    dependent: &mut K,
    robot: &VirtualRobot,
) -> Result<(), ControllerError> {
    let mut owner = robot
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::MissingIdentity(robot.key()))?;
    // Foreground deletion of the VirtualRobot waits for its dependents
    owner.block_owner_deletion = Some(true);
    dependent.meta_mut().owner_references = Some(vec![owner]);
    Ok(())
}

/// Attach the owner reference to all three dependents
pub fn link_dependents(
    desired: &mut DesiredState,
    robot: &VirtualRobot,
) -> Result<(), ControllerError> {
    if robot.uid().is_none() {
        return Err(ControllerError::MissingIdentity(robot.key()));
    }
    attach_owner(&mut desired.workload, robot)?;
    attach_owner(&mut desired.endpoint, robot)?;
    attach_owner(&mut desired.route, robot)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{RouteSettings, build_desired_state};
    use crate::test_utils::create_test_virtual_robot;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn owners<K: Resource>(object: &K) -> &[OwnerReference] {
        object.meta().owner_references.as_deref().unwrap_or_default()
    }

    #[test]
    fn test_link_dependents_sets_controller_reference() {
        let mut robot = create_test_virtual_robot("my-robot", "lab", "r2d2", "bots.io");
        robot.metadata.uid = Some("uid-1".to_string());
        let mut desired = build_desired_state(&robot, &RouteSettings::default()).unwrap();

        link_dependents(&mut desired, &robot).unwrap();

        for refs in [
            owners(&desired.workload),
            owners(&desired.endpoint),
            owners(&desired.route),
        ] {
            assert_eq!(refs.len(), 1);
            let owner = &refs[0];
            assert_eq!(owner.kind, "VirtualRobot");
            assert_eq!(owner.api_version, "robots.ludusrusso.dev/v1alpha1");
            assert_eq!(owner.name, "my-robot");
            assert_eq!(owner.uid, "uid-1");
            assert_eq!(owner.controller, Some(true));
            assert_eq!(owner.block_owner_deletion, Some(true));
        }
    }

    #[test]
    fn test_attach_owner_replaces_existing_references() {
        let mut robot = create_test_virtual_robot("my-robot", "lab", "r2d2", "bots.io");
        robot.metadata.uid = Some("uid-2".to_string());
        let mut desired = build_desired_state(&robot, &RouteSettings::default()).unwrap();
        desired.workload.metadata.owner_references = Some(vec![OwnerReference {
            uid: "stale".to_string(),
            ..Default::default()
        }]);

        attach_owner(&mut desired.workload, &robot).unwrap();
        assert_eq!(owners(&desired.workload).len(), 1);
        assert_eq!(owners(&desired.workload)[0].uid, "uid-2");
    }

    #[test]
    fn test_missing_uid_is_rejected() {
        let robot = create_test_virtual_robot("my-robot", "lab", "r2d2", "bots.io");
        let mut desired = build_desired_state(&robot, &RouteSettings::default()).unwrap();

        let err = link_dependents(&mut desired, &robot).unwrap_err();
        assert!(matches!(err, ControllerError::MissingIdentity(ref key) if key == "lab/my-robot"));
        assert!(desired.workload.metadata.owner_references.is_none());
    }
}
