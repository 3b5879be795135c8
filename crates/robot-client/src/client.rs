//! Kubernetes-backed implementation of [`RobotClusterTrait`].

use crate::cluster_trait::RobotClusterTrait;
use crate::error::ClusterError;
use crds::{VirtualRobot, VirtualRobotStatus};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Cluster access through a [`kube::Client`]
#[derive(Clone)]
pub struct RobotCluster {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for RobotCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotCluster")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl RobotCluster {
    /// Create a cluster handle writing under the given field manager
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    /// Server-side apply with forced ownership.
    ///
    /// Fields set in `desired` are taken over from any other manager; fields
    /// absent from `desired` and owned by someone else are left untouched.
    async fn apply<K>(&self, desired: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let kind = K::kind(&());
        let name = desired
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidObject(format!("{} has no name", kind)))?;
        let namespace = desired.namespace().ok_or_else(|| {
            ClusterError::InvalidObject(format!("{} {} has no namespace", kind, name))
        })?;

        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::apply(&self.field_manager).force();
        let applied = api
            .patch(&name, &params, &Patch::Apply(desired))
            .await
            .map_err(ClusterError::classify)?;

        debug!(
            "Applied {} {}/{} (resourceVersion {})",
            kind,
            namespace,
            name,
            applied.resource_version().unwrap_or_default()
        );
        Ok(applied)
    }
}

#[async_trait::async_trait]
impl RobotClusterTrait for RobotCluster {
    fn field_manager(&self) -> &str {
        &self.field_manager
    }

    async fn get_virtual_robot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualRobot>, ClusterError> {
        let api: Api<VirtualRobot> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(ClusterError::classify)
    }

    async fn apply_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        self.apply(pod).await
    }

    async fn apply_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.apply(service).await
    }

    async fn apply_ingress(&self, ingress: &Ingress) -> Result<Ingress, ClusterError> {
        self.apply(ingress).await
    }

    async fn patch_virtual_robot_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualRobotStatus,
    ) -> Result<(), ClusterError> {
        let api: Api<VirtualRobot> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({
            "status": status
        });
        let pp = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        };
        api.patch_status(name, &pp, &Patch::Merge(&status_patch))
            .await
            .map_err(ClusterError::classify)?;
        Ok(())
    }
}
