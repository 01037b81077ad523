//! Best-effort teardown of a failed deployment attempt
//!
//! When a mandatory phase fails, everything that may have been created for
//! the deployment name is deleted: every resource kind is attempted
//! regardless of whether it was actually created, concurrently, each in its
//! own error boundary. A "not found" delete is success. The runner never
//! fails; per-resource delete failures are logged and collected in the
//! report, and the triggering error is propagated unchanged by the caller.

use futures::future::join_all;
use tracing::{info, warn};

use crate::cluster::ClusterAdapter;
use crate::error::ControlPlaneError;
use crate::manifest::ResourceKind;

/// What a compensation pass managed to delete
#[derive(Clone, Debug, Default)]
pub struct CompensationReport {
    /// Kinds whose delete settled cleanly (deleted, or already absent)
    pub deleted: Vec<ResourceKind>,
    /// Kinds whose delete failed, with the failure
    pub failed: Vec<(ResourceKind, ControlPlaneError)>,
}

impl CompensationReport {
    /// Whether every delete settled cleanly
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runner issuing the concurrent teardown
#[derive(Clone)]
pub struct CompensationRunner {
    adapter: ClusterAdapter,
}

impl CompensationRunner {
    /// Create a runner over the given adapter
    pub fn new(adapter: ClusterAdapter) -> Self {
        Self { adapter }
    }

    /// Delete every resource kind that could exist for `name`.
    ///
    /// Returns only after all delete attempts have settled. Never fails:
    /// callers propagate their original error, not a compensation error.
    pub async fn rollback(&self, namespace: &str, name: &str) -> CompensationReport {
        info!(
            deployment = %name,
            namespace = %namespace,
            "Rolling back partially created resources"
        );

        let deletes = ResourceKind::ALL.map(|kind| {
            let resource_name = kind.resource_name(name);
            async move {
                let result = self.adapter.delete(namespace, kind, &resource_name).await;
                (kind, resource_name, result)
            }
        });

        let mut report = CompensationReport::default();
        for (kind, resource_name, result) in join_all(deletes).await {
            match result {
                Ok(()) => report.deleted.push(kind),
                // Never created, or already gone
                Err(e) if e.is_not_found() => report.deleted.push(kind),
                Err(e) => {
                    warn!(
                        kind = %kind,
                        resource = %resource_name,
                        error = %e,
                        "Rollback delete failed, continuing"
                    );
                    report.failed.push((kind, e));
                }
            }
        }

        info!(
            deployment = %name,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Rollback settled"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cluster::{ControlPlane, MockControlPlane};
    use crate::retry::RetryPolicy;

    fn runner(mock: MockControlPlane) -> CompensationRunner {
        let adapter = ClusterAdapter::with_policy(
            Arc::new(mock) as Arc<dyn ControlPlane>,
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        );
        CompensationRunner::new(adapter)
    }

    // =========================================================================
    // Story: Every Kind Is Attempted
    // =========================================================================

    #[tokio::test]
    async fn story_deletes_every_resource_kind() {
        let mut mock = MockControlPlane::new();
        mock.expect_delete()
            .times(ResourceKind::ALL.len())
            .returning(|_, _, _| Ok(()));

        let report = runner(mock).rollback("tenant-acme", "churn").await;
        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), ResourceKind::ALL.len());
    }

    #[tokio::test]
    async fn story_not_found_counts_as_deleted() {
        let mut mock = MockControlPlane::new();
        mock.expect_delete()
            .returning(|_, kind, _| match kind {
                ResourceKind::Workload | ResourceKind::Endpoint => Ok(()),
                // Optional resources were never created
                _ => Err(ControlPlaneError::with_code(404, "not found")),
            });

        let report = runner(mock).rollback("tenant-acme", "churn").await;
        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), ResourceKind::ALL.len());
    }

    /// One delete failing does not abort the rest: the other four settle and
    /// the failure is recorded, not raised.
    #[tokio::test]
    async fn story_failures_logged_not_raised() {
        let mut mock = MockControlPlane::new();
        mock.expect_delete()
            .times(ResourceKind::ALL.len())
            .returning(|_, kind, _| match kind {
                ResourceKind::Endpoint => {
                    Err(ControlPlaneError::with_code(500, "apiserver on fire"))
                }
                _ => Ok(()),
            });

        let report = runner(mock).rollback("tenant-acme", "churn").await;
        assert!(!report.is_clean());
        assert_eq!(report.deleted.len(), ResourceKind::ALL.len() - 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ResourceKind::Endpoint);
    }

    #[tokio::test]
    async fn story_suffixed_names_used_for_optional_kinds() {
        let mut mock = MockControlPlane::new();
        mock.expect_delete()
            .withf(|_, kind, name| match kind {
                ResourceKind::ScrapeConfig => name == "churn-metrics",
                ResourceKind::AlertRules => name == "churn-alerts",
                _ => name == "churn",
            })
            .times(ResourceKind::ALL.len())
            .returning(|_, _, _| Ok(()));

        let report = runner(mock).rollback("tenant-acme", "churn").await;
        assert!(report.is_clean());
    }
}
