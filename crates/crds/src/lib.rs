//! VirtualRobot CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the VirtualRobot controller.

pub mod virtual_robot;

pub use virtual_robot::*;
