//! Field-ownership bookkeeping for the in-memory cluster
//!
//! Objects are stored as a flat set of leaf fields, each owned by exactly one
//! field manager. Objects are walked recursively; scalars, arrays and empty
//! objects are leaves. Arrays are atomic: a manager owns the whole list.

use crate::error::ClusterError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Path of a leaf field, one segment per object key
pub(crate) type FieldPath = Vec<String>;

/// Fields the API server manages itself; never part of an applied field set
const SERVER_FIELDS: &[&[&str]] = &[
    &["apiVersion"],
    &["kind"],
    &["status"],
    &["metadata", "name"],
    &["metadata", "namespace"],
    &["metadata", "uid"],
    &["metadata", "resourceVersion"],
    &["metadata", "generation"],
    &["metadata", "creationTimestamp"],
    &["metadata", "managedFields"],
];

fn is_server_field(path: &[String]) -> bool {
    SERVER_FIELDS.iter().any(|server| {
        path.len() >= server.len() && server.iter().zip(path).all(|(a, b)| *a == b.as_str())
    })
}

fn is_strict_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() < path.len() && path.starts_with(prefix)
}

/// Flatten an object into its applied leaf fields
pub(crate) fn flatten(value: &Value) -> BTreeMap<FieldPath, Value> {
    fn walk(value: &Value, path: &mut FieldPath, out: &mut BTreeMap<FieldPath, Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    path.push(key.clone());
                    walk(child, path, out);
                    path.pop();
                }
            }
            // Absent optional fields serialize as null, they are not applied
            Value::Null => {}
            leaf => {
                if !path.is_empty() && !is_server_field(path) {
                    out.insert(path.clone(), leaf.clone());
                }
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(value, &mut Vec::new(), &mut out);
    out
}

/// Rebuild a nested object from leaf fields
pub(crate) fn unflatten(fields: &BTreeMap<FieldPath, Value>) -> Map<String, Value> {
    let mut root = Map::new();
    for (path, leaf) in fields {
        let Some((last, parents)) = path.split_last() else {
            continue;
        };
        let mut cursor = &mut root;
        for segment in parents {
            let entry = cursor
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                unreachable!("entry was just made an object");
            };
            cursor = next;
        }
        cursor.insert(last.clone(), leaf.clone());
    }
    root
}

/// Live fields of one object plus the manager owning each field
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldSet {
    pub(crate) fields: BTreeMap<FieldPath, Value>,
    pub(crate) owners: BTreeMap<FieldPath, String>,
}

impl FieldSet {
    /// Server-side apply of `applied` by `manager`.
    ///
    /// Returns whether the live fields changed. Without `force`, a field
    /// owned by another manager holding a different value is a conflict.
    pub(crate) fn apply(
        &mut self,
        manager: &str,
        applied: &BTreeMap<FieldPath, Value>,
        force: bool,
    ) -> Result<bool, ClusterError> {
        if !force {
            let conflicts: Vec<String> = applied
                .iter()
                .filter(|(path, value)| {
                    self.owners.get(*path).is_some_and(|owner| owner != manager)
                        && self.fields.get(*path) != Some(value)
                })
                .map(|(path, _)| path.join("."))
                .collect();
            if !conflicts.is_empty() {
                return Err(ClusterError::Conflict(format!(
                    "fields owned by other managers: {}",
                    conflicts.join(", ")
                )));
            }
        }

        let before = self.fields.clone();

        // Fields this manager applied last time but no longer sets are removed
        let dropped: Vec<FieldPath> = self
            .owners
            .iter()
            .filter(|(path, owner)| owner.as_str() == manager && !applied.contains_key(*path))
            .map(|(path, _)| path.clone())
            .collect();
        for path in dropped {
            self.owners.remove(&path);
            self.fields.remove(&path);
        }

        for (path, value) in applied {
            // A leaf replacing an object (or the reverse) evicts the old shape
            let shadowed: Vec<FieldPath> = self
                .fields
                .keys()
                .filter(|existing| {
                    is_strict_prefix(existing, path) || is_strict_prefix(path, existing)
                })
                .cloned()
                .collect();
            for existing in shadowed {
                self.fields.remove(&existing);
                self.owners.remove(&existing);
            }
            self.fields.insert(path.clone(), value.clone());
            self.owners.insert(path.clone(), manager.to_string());
        }

        Ok(before != self.fields)
    }
}
