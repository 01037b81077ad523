//! Readiness polling for deployed workloads
//!
//! After the resources are created, the orchestrator waits for the workload's
//! ready-replica count to reach its desired count. Status reads go through
//! the retrying adapter; a failed poll is logged and treated as "not yet
//! ready" so a transient status-read failure cannot fail the deployment.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::cluster::ClusterAdapter;
use crate::Error;

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default readiness deadline
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Poller that waits for a workload to reach readiness
#[derive(Clone)]
pub struct ReadinessPoller {
    adapter: ClusterAdapter,
    interval: Duration,
}

impl ReadinessPoller {
    /// Create a poller with the default interval
    pub fn new(adapter: ClusterAdapter) -> Self {
        Self::with_interval(adapter, DEFAULT_POLL_INTERVAL)
    }

    /// Create a poller with a custom interval (tests use milliseconds)
    pub fn with_interval(adapter: ClusterAdapter, interval: Duration) -> Self {
        Self { adapter, interval }
    }

    /// Wait until the workload's ready replicas equal its desired replicas.
    ///
    /// Returns the timestamp readiness was observed at, or
    /// [`Error::Timeout`] once `timeout` has elapsed without it.
    pub async fn wait_until_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<DateTime<Utc>, Error> {
        let start = Instant::now();

        loop {
            if start.elapsed() >= timeout {
                return Err(Error::timeout(name, start.elapsed()));
            }

            match self.adapter.get_workload(namespace, name).await {
                Ok(Some(status)) if status.is_ready() => {
                    debug!(
                        workload = %name,
                        namespace = %namespace,
                        replicas = status.ready_replicas,
                        "Workload ready"
                    );
                    return Ok(Utc::now());
                }
                Ok(Some(status)) => {
                    trace!(
                        workload = %name,
                        ready = status.ready_replicas,
                        desired = status.desired_replicas,
                        "Workload not yet ready"
                    );
                }
                Ok(None) => {
                    // Workload not visible yet, keep waiting
                    trace!(workload = %name, "Workload not found yet");
                }
                Err(e) => {
                    // A poll-level failure must not fail the deployment
                    debug!(workload = %name, error = %e, "Status poll failed, retrying");
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::cluster::{ControlPlane, MockControlPlane, WorkloadStatus};
    use crate::error::ControlPlaneError;
    use crate::retry::RetryPolicy;

    fn fast_poller(mock: MockControlPlane) -> ReadinessPoller {
        let adapter = ClusterAdapter::with_policy(
            Arc::new(mock) as Arc<dyn ControlPlane>,
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        );
        ReadinessPoller::with_interval(adapter, Duration::from_millis(5))
    }

    fn status(desired: u32, ready: u32) -> WorkloadStatus {
        WorkloadStatus {
            desired_replicas: desired,
            ready_replicas: ready,
            available_replicas: ready,
        }
    }

    #[tokio::test]
    async fn ready_on_first_poll() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_workload()
            .returning(|_, _| Ok(Some(status(2, 2))));

        let poller = fast_poller(mock);
        let ready_at = poller
            .wait_until_ready("tenant-acme", "churn", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(ready_at <= Utc::now());
    }

    #[tokio::test]
    async fn becomes_ready_after_scaling_up() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut mock = MockControlPlane::new();
        mock.expect_get_workload().returning(move |_, _| {
            let n = p.fetch_add(1, Ordering::SeqCst);
            Ok(Some(status(3, n.min(3))))
        });

        let poller = fast_poller(mock);
        poller
            .wait_until_ready("tenant-acme", "churn", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn times_out_when_never_ready() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_workload()
            .returning(|_, _| Ok(Some(status(3, 1))));

        let poller = fast_poller(mock);
        let err = poller
            .wait_until_ready("tenant-acme", "churn", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    /// Transient status-read failures are tolerated: the workload becomes
    /// ready on a later poll and the wait still succeeds.
    #[tokio::test]
    async fn poll_errors_treated_as_not_ready() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut mock = MockControlPlane::new();
        mock.expect_get_workload().returning(move |_, _| {
            if p.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ControlPlaneError::with_code(500, "apiserver hiccup"))
            } else {
                Ok(Some(status(2, 2)))
            }
        });

        let poller = fast_poller(mock);
        poller
            .wait_until_ready("tenant-acme", "churn", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_workload_keeps_waiting() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut mock = MockControlPlane::new();
        mock.expect_get_workload().returning(move |_, _| {
            if p.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(None)
            } else {
                Ok(Some(status(1, 1)))
            }
        });

        let poller = fast_poller(mock);
        poller
            .wait_until_ready("tenant-acme", "churn", Duration::from_secs(5))
            .await
            .unwrap();
    }
}
