//! Control-plane client abstraction and the retrying adapter
//!
//! The control plane is an external collaborator reached through the
//! [`ControlPlane`] trait: a declarative create/get/delete interface keyed by
//! `(namespace, name)`. The trait is injected explicitly (no global client
//! state) so tests can substitute mocks and fakes.
//!
//! [`ClusterAdapter`] is the only way the rest of the crate talks to the
//! control plane: it wraps every call in the retry executor so transient
//! API errors are absorbed and terminal ones surface immediately.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneError;
use crate::manifest::{Resource, ResourceKind};
use crate::retry::{with_retry, RetryPolicy};

/// Replica status of a remote workload
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    /// Replicas the workload wants
    pub desired_replicas: u32,
    /// Replicas passing their readiness probe
    pub ready_replicas: u32,
    /// Replicas available to serve traffic
    pub available_replicas: u32,
}

impl WorkloadStatus {
    /// Whether the workload has reached its desired replica count
    pub fn is_ready(&self) -> bool {
        self.desired_replicas > 0 && self.ready_replicas == self.desired_replicas
    }
}

/// Declarative operations the orchestrator needs from the remote cluster
///
/// `get_workload` returns `Ok(None)` when the workload is absent; absence is
/// a valid read result, not an error. Callers rely on this for idempotent
/// existence checks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create the namespace if it does not already exist
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ControlPlaneError>;

    /// Apply one desired-state resource
    async fn apply(&self, namespace: &str, resource: &Resource) -> Result<(), ControlPlaneError>;

    /// Read the replica status of a workload, `None` when absent
    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, ControlPlaneError>;

    /// Delete a resource of the given kind
    async fn delete(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<(), ControlPlaneError>;
}

/// Retrying wrapper around a [`ControlPlane`] handle
///
/// Holds only an `Arc` to the injected client and a retry policy; cloning is
/// cheap and concurrent deployments share no mutable state through it.
#[derive(Clone)]
pub struct ClusterAdapter {
    client: Arc<dyn ControlPlane>,
    policy: RetryPolicy,
}

impl ClusterAdapter {
    /// Wrap a control-plane client with the default retry policy
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    /// Wrap a control-plane client with a custom retry policy
    pub fn with_policy(client: Arc<dyn ControlPlane>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Create the namespace if absent, with retries
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), ControlPlaneError> {
        with_retry(&self.policy, "ensure_namespace", || {
            self.client.ensure_namespace(namespace)
        })
        .await
    }

    /// Apply a resource, with retries
    pub async fn apply(
        &self,
        namespace: &str,
        resource: &Resource,
    ) -> Result<(), ControlPlaneError> {
        let op = format!("apply_{}", resource.kind());
        with_retry(&self.policy, &op, || self.client.apply(namespace, resource)).await
    }

    /// Read workload status, with retries; `None` when absent
    pub async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, ControlPlaneError> {
        with_retry(&self.policy, "get_workload", || {
            self.client.get_workload(namespace, name)
        })
        .await
    }

    /// Delete a resource by kind and name, with retries
    pub async fn delete(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<(), ControlPlaneError> {
        let op = format!("delete_{kind}");
        with_retry(&self.policy, &op, || {
            self.client.delete(namespace, kind, name)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mockall::predicate::eq;

    fn fast_adapter(mock: MockControlPlane, max_attempts: u32) -> ClusterAdapter {
        ClusterAdapter::with_policy(
            Arc::new(mock),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    // =========================================================================
    // Story: Transient Errors Absorbed by the Adapter
    // =========================================================================

    #[tokio::test]
    async fn story_transient_get_retried_until_success() {
        let mut mock = MockControlPlane::new();
        let mut calls = 0u32;
        mock.expect_get_workload()
            .with(eq("tenant-acme"), eq("churn"))
            .times(3)
            .returning_st(move |_, _| {
                calls += 1;
                if calls < 3 {
                    Err(ControlPlaneError::with_code(500, "apiserver hiccup"))
                } else {
                    Ok(Some(WorkloadStatus {
                        desired_replicas: 2,
                        ready_replicas: 2,
                        available_replicas: 2,
                    }))
                }
            });

        let adapter = fast_adapter(mock, 5);
        let status = adapter.get_workload("tenant-acme", "churn").await.unwrap();
        assert!(status.unwrap().is_ready());
    }

    #[tokio::test]
    async fn story_terminal_error_not_retried() {
        let mut mock = MockControlPlane::new();
        mock.expect_ensure_namespace()
            .times(1)
            .returning(|_| Err(ControlPlaneError::with_code(403, "forbidden")));

        let adapter = fast_adapter(mock, 5);
        let err = adapter.ensure_namespace("tenant-acme").await.unwrap_err();
        assert_eq!(err.code, Some(403));
    }

    // =========================================================================
    // Story: Absence Is Not an Error
    // =========================================================================

    #[tokio::test]
    async fn story_absent_workload_reads_as_none() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_workload()
            .times(1)
            .returning(|_, _| Ok(None));

        let adapter = fast_adapter(mock, 3);
        let status = adapter.get_workload("tenant-acme", "missing").await.unwrap();
        assert!(status.is_none());
    }

    #[test]
    fn readiness_requires_nonzero_desired() {
        let status = WorkloadStatus::default();
        assert!(!status.is_ready());

        let status = WorkloadStatus {
            desired_replicas: 3,
            ready_replicas: 3,
            available_replicas: 3,
        };
        assert!(status.is_ready());

        let status = WorkloadStatus {
            desired_replicas: 3,
            ready_replicas: 2,
            available_replicas: 2,
        };
        assert!(!status.is_ready());
    }
}
