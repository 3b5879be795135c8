//! VirtualRobot CRD
//!
//! Declares a remote robot endpoint. The controller materializes each
//! VirtualRobot as a Pod, a Service and a TLS-terminated Ingress.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the VirtualRobot CRD
pub const API_GROUP: &str = "robots.ludusrusso.dev";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "robots.ludusrusso.dev",
    version = "v1alpha1",
    kind = "VirtualRobot",
    namespaced,
    status = "VirtualRobotStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Robot","type":"string","jsonPath":".spec.robotName"}"#,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".status.observedHostname"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRobotSpec {
    /// Name given to every generated Pod, Service and Ingress.
    /// Must be a DNS-1123 label, it is also the first label of the external host.
    pub robot_name: String,

    /// DNS suffix of the external host (`<robotName>.<baseDomain>`)
    pub base_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRobotStatus {
    /// Externally routable host, written by the controller once the
    /// Pod, Service and Ingress have all been applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_hostname: Option<String>,
}

impl VirtualRobot {
    /// `namespace/name` key used in logs and backoff bookkeeping
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().as_deref().unwrap_or(""),
            self.name_any()
        )
    }

    /// Last hostname reported by the controller, if any
    pub fn observed_hostname(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.observed_hostname.as_deref())
            .filter(|h| !h.is_empty())
    }
}
