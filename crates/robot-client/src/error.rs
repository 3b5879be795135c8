//! Cluster access errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes client/transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because another field manager owns a field
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server rejected or could not process the request
    #[error("Kubernetes API error: {0}")]
    Api(String),

    /// Object cannot be submitted (e.g. missing name or namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Maps well-known API status codes onto dedicated variants.
    pub fn classify(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ae) if ae.code == 404 || ae.code == 410 => {
                ClusterError::NotFound(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => ClusterError::Conflict(ae.message.clone()),
            e => ClusterError::Kube(e),
        }
    }

    /// Whether the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Whether the error is a field-ownership or optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}
