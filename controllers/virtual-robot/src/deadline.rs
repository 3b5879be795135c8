//! Per-reconcile deadline.
//!
//! Every API call of one reconcile shares a single deadline. A call still
//! pending when it passes is abandoned and the reconcile fails with
//! [`ControllerError::Timeout`].

use crate::error::ControllerError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// Point in time after which pending API calls are abandoned
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Run `fut`, failing with a timeout naming `step` if the deadline passes first
    pub async fn run<T, F>(&self, step: &str, fut: F) -> Result<T, ControllerError>
    where
        F: Future<Output = Result<T, ControllerError>>,
    {
        match timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ControllerError::Timeout(step.to_string())),
        }
    }
}
