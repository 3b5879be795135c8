//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::builders::RouteSettings;
use crate::reconciler::Reconciler;
use crate::FIELD_MANAGER;
use crds::{VirtualRobot, VirtualRobotSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use robot_client::MockRobotCluster;
use std::sync::Arc;
use std::time::Duration;

/// Reconcile deadline used by test reconcilers
pub const TEST_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Helper to create a test VirtualRobot (no uid, no status)
pub fn create_test_virtual_robot(
    name: &str,
    namespace: &str,
    robot_name: &str,
    base_domain: &str,
) -> VirtualRobot {
    VirtualRobot {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: VirtualRobotSpec {
            robot_name: robot_name.to_string(),
            base_domain: base_domain.to_string(),
        },
        status: None,
    }
}

/// Helper to create an empty mock cluster using the controller's field manager
pub fn create_test_cluster() -> MockRobotCluster {
    MockRobotCluster::new(FIELD_MANAGER)
}

/// Helper to create a Reconciler sharing state with `cluster`
pub fn create_test_reconciler(cluster: &MockRobotCluster) -> Reconciler {
    Reconciler::new(
        Arc::new(cluster.clone()),
        RouteSettings::default(),
        TEST_RECONCILE_TIMEOUT,
    )
}
