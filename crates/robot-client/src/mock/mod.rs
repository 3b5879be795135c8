//! Mock RobotCluster for unit testing
//!
//! This module provides an in-memory implementation of [`RobotClusterTrait`]
//! that can be used in unit tests without a running API server.
//!
//! Generated objects are stored with per-field ownership (see `ownership.rs`),
//! so repeated applies, applies by other managers and forced takeovers behave
//! like server-side apply. Owner references are honoured by
//! [`MockRobotCluster::collect_garbage`].

mod ownership;

use crate::cluster_trait::RobotClusterTrait;
use crate::error::ClusterError;
use crds::{VirtualRobot, VirtualRobotStatus};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};
use ownership::{FieldSet, flatten, unflatten};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identifies a stored object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Kubernetes kind (e.g. `Pod`)
    pub kind: String,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Build a key for kind `K`
    pub fn of<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Operations of [`RobotClusterTrait`], used for failure injection and write accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `get_virtual_robot`
    GetVirtualRobot,
    /// `apply_pod`
    ApplyPod,
    /// `apply_service`
    ApplyService,
    /// `apply_ingress`
    ApplyIngress,
    /// `patch_virtual_robot_status`
    PatchStatus,
}

/// A write accepted by the mock cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockWrite {
    /// Operation that performed the write
    pub operation: MockOperation,
    /// Target namespace
    pub namespace: String,
    /// Target name
    pub name: String,
}

#[derive(Debug, Clone)]
struct StoredObject {
    api_version: String,
    uid: String,
    resource_version: u64,
    field_set: FieldSet,
}

impl StoredObject {
    fn to_value(&self, key: &ObjectKey) -> Value {
        let mut root = unflatten(&self.field_set.fields);
        root.insert("apiVersion".to_string(), Value::from(self.api_version.clone()));
        root.insert("kind".to_string(), Value::from(key.kind.clone()));
        let metadata = root
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(metadata) = metadata {
            metadata.insert("name".to_string(), Value::from(key.name.clone()));
            metadata.insert("namespace".to_string(), Value::from(key.namespace.clone()));
            metadata.insert("uid".to_string(), Value::from(self.uid.clone()));
            metadata.insert(
                "resourceVersion".to_string(),
                Value::from(self.resource_version.to_string()),
            );
        }
        Value::Object(root)
    }

    fn owner_uids(&self) -> Vec<String> {
        let path = vec!["metadata".to_string(), "ownerReferences".to_string()];
        self.field_set
            .fields
            .get(&path)
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| r.get("uid").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory cluster for testing
///
/// Cloning shares the underlying state, so a test can keep a handle while
/// the reconciler owns another.
#[derive(Debug, Clone)]
pub struct MockRobotCluster {
    field_manager: String,
    robots: Arc<Mutex<BTreeMap<(String, String), VirtualRobot>>>,
    objects: Arc<Mutex<BTreeMap<ObjectKey, StoredObject>>>,
    failures: Arc<Mutex<HashMap<MockOperation, String>>>,
    latencies: Arc<Mutex<HashMap<MockOperation, Duration>>>,
    writes: Arc<Mutex<Vec<MockWrite>>>,
    // Counter for resourceVersions
    next_version: Arc<Mutex<u64>>,
}

impl MockRobotCluster {
    /// Create an empty cluster whose trait writes use `field_manager`
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            robots: Arc::new(Mutex::new(BTreeMap::new())),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            latencies: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            next_version: Arc::new(Mutex::new(1)),
        }
    }

    fn next_version(&self) -> u64 {
        let mut version = lock(&self.next_version);
        let current = *version;
        *version += 1;
        current
    }

    /// Add (or replace) a VirtualRobot (for test setup)
    ///
    /// Assigns a uid when the object has none, like the API server does on create.
    pub fn add_virtual_robot(&self, mut robot: VirtualRobot) -> VirtualRobot {
        if robot.metadata.uid.is_none() {
            robot.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        robot.metadata.resource_version = Some(self.next_version().to_string());
        robot.metadata.generation = Some(1);
        let key = (
            robot.namespace().unwrap_or_default(),
            robot.name_any(),
        );
        lock(&self.robots).insert(key, robot.clone());
        robot
    }

    /// Remove a VirtualRobot; owned objects stay until [`Self::collect_garbage`]
    pub fn delete_virtual_robot(&self, namespace: &str, name: &str) -> Option<VirtualRobot> {
        lock(&self.robots).remove(&(namespace.to_string(), name.to_string()))
    }

    /// Current stored copy of a VirtualRobot
    pub fn virtual_robot(&self, namespace: &str, name: &str) -> Option<VirtualRobot> {
        lock(&self.robots)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make every subsequent call of `operation` fail with an API error
    pub fn fail(&self, operation: MockOperation, message: impl Into<String>) {
        lock(&self.failures).insert(operation, message.into());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Delay every subsequent call of `operation`
    pub fn set_latency(&self, operation: MockOperation, latency: Duration) {
        lock(&self.latencies).insert(operation, latency);
    }

    /// All writes accepted so far, in order
    pub fn writes(&self) -> Vec<MockWrite> {
        lock(&self.writes).clone()
    }

    /// Forget recorded writes (state is kept)
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    /// Keys of all stored generated objects
    pub fn object_keys(&self) -> Vec<ObjectKey> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Fetch a stored object of kind `K`
    pub fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let key = ObjectKey::of::<K>(namespace, name);
        let objects = lock(&self.objects);
        match objects.get(&key) {
            Some(stored) => Ok(Some(serde_json::from_value(stored.to_value(&key))?)),
            None => Ok(None),
        }
    }

    /// resourceVersion of a stored object; it only moves when fields change
    pub fn resource_version(&self, key: &ObjectKey) -> Option<u64> {
        lock(&self.objects).get(key).map(|o| o.resource_version)
    }

    /// Manager owning the field at `path` (dot-free segments) of a stored object
    pub fn field_owner(&self, key: &ObjectKey, path: &[&str]) -> Option<String> {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        lock(&self.objects)
            .get(key)
            .and_then(|o| o.field_set.owners.get(&path).cloned())
    }

    /// Server-side apply `object` as `manager` (for simulating other actors)
    pub fn apply_as<K>(&self, manager: &str, object: &K, force: bool) -> Result<(), ClusterError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        self.apply_object(manager, object, force).map(|_| ())
    }

    /// Delete objects none of whose owners exist anymore, like the
    /// Kubernetes garbage collector. Returns the deleted keys.
    pub fn collect_garbage(&self) -> Vec<ObjectKey> {
        let live_uids: HashSet<String> = lock(&self.robots)
            .values()
            .filter_map(|r| r.metadata.uid.clone())
            .collect();
        let mut objects = lock(&self.objects);
        let orphans: Vec<ObjectKey> = objects
            .iter()
            .filter(|(_, stored)| {
                let owners = stored.owner_uids();
                !owners.is_empty() && owners.iter().all(|uid| !live_uids.contains(uid))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &orphans {
            objects.remove(key);
        }
        orphans
    }

    fn apply_object<K>(
        &self,
        manager: &str,
        object: &K,
        force: bool,
    ) -> Result<ObjectKey, ClusterError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let kind = K::kind(&()).to_string();
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidObject(format!("{} has no name", kind)))?;
        let namespace = object.meta().namespace.clone().ok_or_else(|| {
            ClusterError::InvalidObject(format!("{} {} has no namespace", kind, name))
        })?;
        let key = ObjectKey {
            kind,
            namespace,
            name,
        };
        let applied = flatten(&serde_json::to_value(object)?);

        let mut objects = lock(&self.objects);
        let mut stored = objects.get(&key).cloned().unwrap_or_else(|| StoredObject {
            api_version: K::api_version(&()).to_string(),
            uid: uuid::Uuid::new_v4().to_string(),
            resource_version: 0,
            field_set: FieldSet::default(),
        });
        let changed = stored.field_set.apply(manager, &applied, force)?;
        if changed || stored.resource_version == 0 {
            stored.resource_version = self.next_version();
        }
        objects.insert(key.clone(), stored);
        Ok(key)
    }

    async fn enter(&self, operation: MockOperation) -> Result<(), ClusterError> {
        let latency = lock(&self.latencies).get(&operation).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failures).get(&operation) {
            Some(message) => Err(ClusterError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, operation: MockOperation, namespace: &str, name: &str) {
        lock(&self.writes).push(MockWrite {
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    async fn apply_typed<K>(&self, operation: MockOperation, object: &K) -> Result<K, ClusterError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        self.enter(operation).await?;
        let key = self.apply_object(&self.field_manager, object, true)?;
        self.record(operation, &key.namespace, &key.name);
        self.get::<K>(&key.namespace, &key.name)?
            .ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }
}

#[async_trait::async_trait]
impl RobotClusterTrait for MockRobotCluster {
    fn field_manager(&self) -> &str {
        &self.field_manager
    }

    async fn get_virtual_robot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualRobot>, ClusterError> {
        self.enter(MockOperation::GetVirtualRobot).await?;
        Ok(self.virtual_robot(namespace, name))
    }

    async fn apply_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        self.apply_typed(MockOperation::ApplyPod, pod).await
    }

    async fn apply_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.apply_typed(MockOperation::ApplyService, service).await
    }

    async fn apply_ingress(&self, ingress: &Ingress) -> Result<Ingress, ClusterError> {
        self.apply_typed(MockOperation::ApplyIngress, ingress).await
    }

    async fn patch_virtual_robot_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualRobotStatus,
    ) -> Result<(), ClusterError> {
        self.enter(MockOperation::PatchStatus).await?;
        let mut robots = lock(&self.robots);
        let robot = robots
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound(format!("VirtualRobot {}/{}", namespace, name)))?;

        // Merge patch: only fields present in the patch are replaced
        let mut merged = robot.status.clone().unwrap_or_default();
        if let Some(hostname) = &status.observed_hostname {
            merged.observed_hostname = Some(hostname.clone());
        }
        if robot.status.as_ref() != Some(&merged) {
            robot.status = Some(merged);
            robot.metadata.resource_version = Some(self.next_version().to_string());
        }
        drop(robots);
        self.record(MockOperation::PatchStatus, namespace, name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap as Map;

    fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("lab".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Map<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_and_read_back() {
        let cluster = MockRobotCluster::new("virtualrobot");
        cluster
            .apply_as("virtualrobot", &config_map("cm", &[("a", "1")]), true)
            .unwrap();

        let stored: ConfigMap = cluster.get("lab", "cm").unwrap().unwrap();
        assert_eq!(stored.name_any(), "cm");
        assert_eq!(stored.namespace().as_deref(), Some("lab"));
        assert!(stored.metadata.uid.is_some());
        assert_eq!(stored.data.unwrap()["a"], "1");
    }

    #[test]
    fn test_resource_version_moves_only_on_change() {
        let cluster = MockRobotCluster::new("virtualrobot");
        let key = ObjectKey::of::<ConfigMap>("lab", "cm");
        cluster
            .apply_as("virtualrobot", &config_map("cm", &[("a", "1")]), true)
            .unwrap();
        let first = cluster.resource_version(&key).unwrap();

        cluster
            .apply_as("virtualrobot", &config_map("cm", &[("a", "1")]), true)
            .unwrap();
        assert_eq!(cluster.resource_version(&key), Some(first));

        cluster
            .apply_as("virtualrobot", &config_map("cm", &[("a", "2")]), true)
            .unwrap();
        assert!(cluster.resource_version(&key).unwrap() > first);
    }

    #[test]
    fn test_garbage_collection_follows_owner_references() {
        let cluster = MockRobotCluster::new("virtualrobot");
        let robot = cluster.add_virtual_robot(VirtualRobot {
            metadata: ObjectMeta {
                name: Some("owner".to_string()),
                namespace: Some("lab".to_string()),
                ..Default::default()
            },
            spec: crds::VirtualRobotSpec {
                robot_name: "r2d2".to_string(),
                base_domain: "bots.io".to_string(),
            },
            status: None,
        });

        let mut owned = config_map("owned", &[]);
        owned.metadata.owner_references = robot.controller_owner_ref(&()).map(|r| vec![r]);
        cluster.apply_as("virtualrobot", &owned, true).unwrap();
        cluster
            .apply_as("virtualrobot", &config_map("unowned", &[]), true)
            .unwrap();

        assert!(cluster.collect_garbage().is_empty());

        cluster.delete_virtual_robot("lab", "owner");
        let collected = cluster.collect_garbage();
        assert_eq!(collected, vec![ObjectKey::of::<ConfigMap>("lab", "owned")]);
        assert_eq!(cluster.object_keys(), vec![ObjectKey::of::<ConfigMap>("lab", "unowned")]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_not_recorded() {
        let cluster = MockRobotCluster::new("virtualrobot");
        cluster.fail(MockOperation::PatchStatus, "etcd unavailable");
        let err = cluster
            .patch_virtual_robot_status("lab", "missing", &VirtualRobotStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Api(ref m) if m == "etcd unavailable"));
        assert!(cluster.writes().is_empty());
    }
}
