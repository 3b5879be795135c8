//! Controller configuration loaded from environment variables.

use crate::builders::RouteSettings;
use crate::error::ControllerError;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONCILE_CONCURRENCY: u16 = 3;

/// Startup configuration of the VirtualRobot Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Deadline for one reconcile, shared by all its API calls
    pub reconcile_timeout: Duration,
    /// Ingress class and certificate issuer of generated Ingresses
    pub route_settings: RouteSettings,
    /// Maximum number of VirtualRobots reconciled at the same time
    pub concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            route_settings: RouteSettings::default(),
            concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = RouteSettings::default();

        let reconcile_timeout_secs = parse(
            "RECONCILE_TIMEOUT_SECS",
            var("RECONCILE_TIMEOUT_SECS"),
            DEFAULT_RECONCILE_TIMEOUT_SECS,
        )?;
        if reconcile_timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        let concurrency = parse(
            "RECONCILE_CONCURRENCY",
            var("RECONCILE_CONCURRENCY"),
            DEFAULT_RECONCILE_CONCURRENCY,
        )?;

        Ok(Self {
            namespace: var("WATCH_NAMESPACE"),
            reconcile_timeout: Duration::from_secs(reconcile_timeout_secs),
            route_settings: RouteSettings {
                ingress_class: var("INGRESS_CLASS").unwrap_or(defaults.ingress_class),
                cluster_issuer: var("CLUSTER_ISSUER").unwrap_or(defaults.cluster_issuer),
            },
            concurrency,
        })
    }
}

fn parse<T>(name: &str, value: Option<String>, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
        None => Ok(default),
    }
}
