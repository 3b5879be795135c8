//! Kubernetes resource watcher.
//!
//! Drives reconciliation with `kube_runtime::Controller`: VirtualRobots are
//! watched directly, Pods, Services and Ingresses through their controller
//! owner reference, so drift on a dependent re-triggers its VirtualRobot.

use crate::error::ControllerError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::VirtualRobot;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    Controller,
    controller::{self, Action, Config as ControllerConfig},
    reflector::ObjectRef,
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconcile entry point called by the controller runtime
async fn reconcile(
    robot: Arc<VirtualRobot>,
    reconciler: Arc<Reconciler>,
) -> Result<Action, ControllerError> {
    let namespace = robot.namespace().ok_or_else(|| {
        ControllerError::Validation(format!("VirtualRobot {} has no namespace", robot.name_any()))
    })?;
    match reconciler.reconcile(&namespace, &robot.name_any()).await? {
        ReconcileOutcome::SourceMissing => {
            debug!("VirtualRobot {} vanished before reconcile", robot.key());
        }
        ReconcileOutcome::Converged { hostname } => {
            debug!("VirtualRobot {} converged at {}", robot.key(), hostname);
        }
    }
    // The next event on the VirtualRobot or one of its dependents re-runs the loop
    Ok(Action::await_change())
}

/// Requeue policy: per-key Fibonacci backoff
fn error_policy(
    robot: Arc<VirtualRobot>,
    error: &ControllerError,
    reconciler: Arc<Reconciler>,
) -> Action {
    Action::requeue(reconciler.backoff_for(&robot.key(), error))
}

type ReconcileResult<QueueErr> =
    Result<(ObjectRef<VirtualRobot>, Action), controller::Error<ControllerError, QueueErr>>;

/// Drop backoff state once the runtime reports the VirtualRobot gone.
///
/// Scheduled requeues and events on orphaned dependents of a deleted
/// VirtualRobot end up here instead of in `reconcile`.
fn forget_if_gone<QueueErr>(reconciler: &Reconciler, result: &ReconcileResult<QueueErr>) {
    if let Err(controller::Error::ObjectNotFound(obj_ref)) = result {
        let key = format!(
            "{}/{}",
            obj_ref.namespace.as_deref().unwrap_or(""),
            obj_ref.name
        );
        reconciler.forget(&key);
    }
}

/// Watches VirtualRobots and the objects they own.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    robot_api: Api<VirtualRobot>,
    pod_api: Api<Pod>,
    service_api: Api<Service>,
    ingress_api: Api<Ingress>,
    concurrency: u16,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("reconciler", &self.reconciler)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

impl Watcher {
    /// Creates a watcher over one namespace, or all namespaces when `namespace` is `None`.
    pub fn new(
        reconciler: Arc<Reconciler>,
        client: &Client,
        namespace: Option<&str>,
        concurrency: u16,
    ) -> Self {
        Self {
            reconciler,
            robot_api: scoped_api(client, namespace),
            pod_api: scoped_api(client, namespace),
            service_api: scoped_api(client, namespace),
            ingress_api: scoped_api(client, namespace),
            concurrency,
        }
    }

    /// Run until the controller stream ends (on SIGTERM / Ctrl-C).
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting VirtualRobot watcher (concurrency {})", self.concurrency);

        // Debounce batches the burst of events caused by our own applies
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(self.concurrency);
        let reconciler = Arc::clone(&self.reconciler);

        Controller::new(self.robot_api, watcher::Config::default())
            .owns(self.pod_api, watcher::Config::default())
            .owns(self.service_api, watcher::Config::default())
            .owns(self.ingress_api, watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler)
            .for_each(|res| {
                forget_if_gone(&reconciler, &res);
                async move {
                    match res {
                        Ok((obj_ref, _)) => debug!("Reconciled {}", obj_ref),
                        Err(controller::Error::ReconcilerFailed(e, obj_ref)) => {
                            warn!("Reconcile of {} failed: {}", obj_ref, e);
                        }
                        Err(controller::Error::ObjectNotFound(obj_ref)) => {
                            debug!("{} is gone, nothing to reconcile", obj_ref);
                        }
                        Err(e) => error!("Controller error: {}", e),
                    }
                }
            })
            .await;

        info!("VirtualRobot watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_cluster, create_test_reconciler};
    use std::convert::Infallible;

    #[test]
    fn test_missing_object_drops_backoff_state() {
        let reconciler = create_test_reconciler(&create_test_cluster());
        let error = ControllerError::Timeout("apply Pod".to_string());
        reconciler.backoff_for("lab/my-robot", &error);
        reconciler.backoff_for("lab/other-robot", &error);
        assert_eq!(reconciler.tracked_keys(), 2);

        let gone: ReconcileResult<Infallible> = Err(controller::Error::ObjectNotFound(
            ObjectRef::<VirtualRobot>::new("my-robot").within("lab").erase(),
        ));
        forget_if_gone(&reconciler, &gone);

        assert_eq!(reconciler.tracked_keys(), 1);
        assert_eq!(reconciler.error_count("lab/my-robot"), 0);
        assert_eq!(reconciler.error_count("lab/other-robot"), 1);
    }

    #[test]
    fn test_other_results_keep_backoff_state() {
        let reconciler = create_test_reconciler(&create_test_cluster());
        reconciler.backoff_for("lab/my-robot", &ControllerError::Timeout("fetch".to_string()));

        let failed: ReconcileResult<Infallible> = Err(controller::Error::ReconcilerFailed(
            ControllerError::Timeout("fetch".to_string()),
            ObjectRef::<VirtualRobot>::new("my-robot").within("lab").erase(),
        ));
        forget_if_gone(&reconciler, &failed);

        assert_eq!(reconciler.tracked_keys(), 1);
    }
}
