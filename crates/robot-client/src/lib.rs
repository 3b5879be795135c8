//! Kubernetes access layer for the VirtualRobot controller.
//!
//! Every API call the controller makes goes through [`RobotClusterTrait`]:
//! reading `VirtualRobot` objects, server-side applying the generated Pod,
//! Service and Ingress, and patching the `VirtualRobot` status sub-resource.
//!
//! [`RobotCluster`] talks to a real API server through [`kube::Client`].
//! With the `test-util` feature, [`MockRobotCluster`] provides an in-memory
//! cluster that tracks field ownership the way server-side apply does.
//!
//! # Example
//!
//! ```no_run
//! use robot_client::{RobotCluster, RobotClusterTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let cluster = RobotCluster::new(client, "virtualrobot");
//!
//! if let Some(robot) = cluster.get_virtual_robot("default", "r2d2").await? {
//!     println!("robot {} wants {}", robot.spec.robot_name, robot.spec.base_domain);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::RobotCluster;
pub use cluster_trait::RobotClusterTrait;
pub use error::ClusterError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockOperation, MockRobotCluster, MockWrite, ObjectKey};
