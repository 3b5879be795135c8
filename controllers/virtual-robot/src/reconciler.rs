//! Reconciliation of VirtualRobots.
//!
//! One reconcile walks Fetching, Building, Linking, Applying (Pod, Service,
//! Ingress) and ReportingStatus in order. Any step failing aborts the rest;
//! dependents applied before the failure are left as they are and a later
//! reconcile finishes convergence.

use crate::apply::{Dependent, apply};
use crate::backoff::FibonacciBackoff;
use crate::builders::{RouteSettings, build_desired_state};
use crate::deadline::Deadline;
use crate::error::ControllerError;
use crate::ownership::link_dependents;
use crate::status::report_status;
use robot_client::RobotClusterTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backoff state for a VirtualRobot
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// How a successful reconcile ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The VirtualRobot no longer exists; nothing was written
    SourceMissing,
    /// All dependents applied and the hostname reported
    Converged {
        /// Hostname written to `status.observedHostname`
        hostname: String,
    },
}

/// Reconciles VirtualRobots into Pods, Services and Ingresses.
pub struct Reconciler {
    pub(crate) cluster: Arc<dyn RobotClusterTrait>,
    route_settings: RouteSettings,
    reconcile_timeout: Duration,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("field_manager", &self.cluster.field_manager())
            .field("route_settings", &self.route_settings)
            .field("reconcile_timeout", &self.reconcile_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    pub fn new(
        cluster: Arc<dyn RobotClusterTrait>,
        route_settings: RouteSettings,
        reconcile_timeout: Duration,
    ) -> Self {
        Self {
            cluster,
            route_settings,
            reconcile_timeout,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn backoff_states(&self) -> MutexGuard<'_, HashMap<String, BackoffState>> {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconcile the VirtualRobot `namespace/name`.
    ///
    /// Safe to call any number of times for the same key: once converged,
    /// a reconcile changes nothing in the cluster.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = format!("{}/{}", namespace, name);
        let deadline = Deadline::after(self.reconcile_timeout);
        let cluster = self.cluster.as_ref();

        debug!("Reconciling VirtualRobot {}", key);

        let fetched = deadline
            .run("fetch VirtualRobot", async {
                cluster
                    .get_virtual_robot(namespace, name)
                    .await
                    .map_err(ControllerError::from)
            })
            .await?;
        let Some(robot) = fetched else {
            debug!(
                "VirtualRobot {} not found, dependents are left to garbage collection",
                key
            );
            self.forget(&key);
            return Ok(ReconcileOutcome::SourceMissing);
        };

        let mut desired = build_desired_state(&robot, &self.route_settings)?;
        link_dependents(&mut desired, &robot)?;

        let hostname = desired.hostname;
        for dependent in [
            Dependent::Workload(desired.workload),
            Dependent::Endpoint(desired.endpoint),
            Dependent::Route(desired.route),
        ] {
            let step = format!("apply {}", dependent.kind());
            deadline.run(&step, apply(cluster, &dependent)).await?;
        }

        deadline
            .run("update status", report_status(cluster, &robot, &hostname))
            .await?;

        if robot.observed_hostname() != Some(hostname.as_str()) {
            info!("VirtualRobot {} is reachable at {}", key, hostname);
        } else {
            debug!("VirtualRobot {} already converged at {}", key, hostname);
        }
        self.reset_error(&key);
        Ok(ReconcileOutcome::Converged { hostname })
    }

    /// Requeue delay after `error` for the VirtualRobot `key`.
    ///
    /// Retryable errors walk the Fibonacci sequence; errors that need the
    /// user to fix the VirtualRobot go straight to the longest delay.
    pub fn backoff_for(&self, key: &str, error: &ControllerError) -> Duration {
        let mut states = self.backoff_states();
        let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
        state.increment_error();
        let delay = if error.is_retryable() {
            state.backoff.next_backoff()
        } else {
            state.backoff.max_backoff()
        };
        warn!(
            "Reconcile of VirtualRobot {} failed ({} consecutive errors), requeue in {}s: {}",
            key,
            state.error_count,
            delay.as_secs(),
            error
        );
        delay
    }

    /// Drop the backoff state of a VirtualRobot that no longer exists
    pub fn forget(&self, key: &str) {
        if self.backoff_states().remove(key).is_some() {
            debug!("Dropped backoff state of VirtualRobot {}", key);
        }
    }

    fn reset_error(&self, key: &str) {
        if let Some(state) = self.backoff_states().get_mut(key) {
            state.reset();
        }
    }

    /// Consecutive failed reconciles recorded for `key`
    #[cfg(test)]
    pub fn error_count(&self, key: &str) -> u32 {
        self.backoff_states()
            .get(key)
            .map_or(0, |state| state.error_count)
    }

    /// Number of VirtualRobots with backoff state
    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.backoff_states().len()
    }
}
