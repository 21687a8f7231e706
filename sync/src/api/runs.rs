use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::service::{Operation, OperationReport, SyncService};

/// Why a triggered run did not produce a report.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{0} is already running")]
    AlreadyRunning(Operation),
    #[error(transparent)]
    Failed(#[from] SyncError),
    #[error("{operation} run aborted: {message}")]
    Aborted {
        operation: Operation,
        message: String,
    },
}

/// Tracks which operations are running. At most one run per operation.
///
/// Shared by the HTTP handlers and the scheduler so that neither can start a
/// run the other already has in flight.
#[derive(Debug, Default)]
pub struct RunRegistry {
    /// operation → when the active run started
    active: Mutex<HashMap<Operation, DateTime<Utc>>>,
}

/// Marks an operation as running until dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    operation: Operation,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.operation);
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `operation`, or `None` if a run of it is already active.
    pub fn try_start(self: &Arc<Self>, operation: Operation) -> Option<RunGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(&operation) {
            return None;
        }
        active.insert(operation, Utc::now());
        Some(RunGuard {
            registry: Arc::clone(self),
            operation,
        })
    }

    pub fn running_since(&self, operation: Operation) -> Option<DateTime<Utc>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
    }

    /// Run `operation` on `service` unless a run of it is already active.
    ///
    /// The run is spawned as its own task and holds the guard itself, so it
    /// completes even if the caller stops waiting for the report.
    pub async fn run_exclusive(
        self: &Arc<Self>,
        service: &Arc<SyncService>,
        operation: Operation,
    ) -> Result<OperationReport, RunError> {
        let Some(guard) = self.try_start(operation) else {
            tracing::warn!(%operation, "Run rejected; operation already running");
            return Err(RunError::AlreadyRunning(operation));
        };

        let service = Arc::clone(service);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            service.run(operation).await
        });

        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => {
                tracing::error!(%operation, error = %e, "Run task aborted");
                Err(RunError::Aborted {
                    operation,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_rejected_until_released() {
        let registry = Arc::new(RunRegistry::new());

        let guard = registry.try_start(Operation::Enrich).unwrap();
        assert!(registry.try_start(Operation::Enrich).is_none());
        assert!(registry.running_since(Operation::Enrich).is_some());

        drop(guard);
        assert!(registry.running_since(Operation::Enrich).is_none());
        assert!(registry.try_start(Operation::Enrich).is_some());
    }

    #[test]
    fn test_operations_are_independent() {
        let registry = Arc::new(RunRegistry::new());
        let _refresh = registry.try_start(Operation::Refresh).unwrap();
        assert!(registry.try_start(Operation::Changelog).is_some());
    }
}
