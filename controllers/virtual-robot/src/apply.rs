//! Server-side apply of generated objects.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use robot_client::RobotClusterTrait;
use tracing::debug;

/// One generated object, applied in the order Workload, Endpoint, Route
#[derive(Debug, Clone)]
pub enum Dependent {
    /// Robot Pod
    Workload(Pod),
    /// Service in front of the Pod
    Endpoint(Service),
    /// TLS Ingress routing the external host to the Service
    Route(Ingress),
}

impl Dependent {
    /// Kubernetes kind of the object
    pub fn kind(&self) -> &'static str {
        match self {
            Dependent::Workload(_) => "Pod",
            Dependent::Endpoint(_) => "Service",
            Dependent::Route(_) => "Ingress",
        }
    }

    /// `(namespace, name)` of the object
    pub fn target(&self) -> (String, String) {
        let (namespace, name) = match self {
            Dependent::Workload(pod) => (pod.namespace(), pod.name_any()),
            Dependent::Endpoint(service) => (service.namespace(), service.name_any()),
            Dependent::Route(ingress) => (ingress.namespace(), ingress.name_any()),
        };
        (namespace.unwrap_or_default(), name)
    }
}

/// Apply `dependent` with forced ownership under the cluster's field manager.
///
/// Fields set by other managers and not present in the desired object are
/// left untouched. Re-applying an unchanged object is a no-op.
pub async fn apply(
    cluster: &dyn RobotClusterTrait,
    dependent: &Dependent,
) -> Result<(), ControllerError> {
    let result = match dependent {
        Dependent::Workload(pod) => cluster.apply_pod(pod).await.map(|_| ()),
        Dependent::Endpoint(service) => cluster.apply_service(service).await.map(|_| ()),
        Dependent::Route(ingress) => cluster.apply_ingress(ingress).await.map(|_| ()),
    };
    let (namespace, name) = dependent.target();
    result.map_err(|source| ControllerError::Apply {
        kind: dependent.kind(),
        namespace: namespace.clone(),
        name: name.clone(),
        source,
    })?;
    debug!("Applied {} {}/{}", dependent.kind(), namespace, name);
    Ok(())
}
