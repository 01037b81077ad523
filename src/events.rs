//! Deployment progress events and metrics
//!
//! The orchestrator reports progress as data, not callbacks: phase
//! transitions go out on an optional channel consumable as a stream, and a
//! completion event is published to an injected [`EventSink`]. Both are
//! fire-and-forget; a full channel or a failing sink never fails the
//! deployment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Saga phase of a deployment workflow
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeployPhase {
    /// Request received, nothing checked yet
    #[default]
    Pending,
    /// Request invariants being checked
    Validating,
    /// Checking the deployment name is unused
    NameCheck,
    /// Creating workload and endpoint
    CreatingMandatory,
    /// Creating autoscaling and monitoring resources
    CreatingOptional,
    /// Waiting for ready replicas to reach desired
    WaitingReady,
    /// Deployment is serving
    Healthy,
    /// Deployment failed; reachable from any phase after Pending
    Failed,
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Validating => write!(f, "validating"),
            Self::NameCheck => write!(f, "nameCheck"),
            Self::CreatingMandatory => write!(f, "creatingMandatory"),
            Self::CreatingOptional => write!(f, "creatingOptional"),
            Self::WaitingReady => write!(f, "waitingReady"),
            Self::Healthy => write!(f, "healthy"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One phase transition of a running deployment
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    /// Deployment the transition belongs to
    pub deployment_id: String,
    /// Phase entered
    pub phase: DeployPhase,
    /// When the phase was entered
    pub at: DateTime<Utc>,
}

/// Final outcome label for the completion event
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeployOutcome {
    /// Deployment reached Healthy
    Succeeded,
    /// Deployment failed
    Failed,
}

impl std::fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Completion event emitted once per deploy invocation
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    /// Model that was deployed
    pub model_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Deployment id
    pub deployment_id: String,
    /// Wall-clock duration of the whole workflow
    pub duration: Duration,
    /// Final outcome
    pub outcome: DeployOutcome,
}

/// Sink for completion events (message bus, audit log, ...)
///
/// Publishing is fire-and-forget: implementations swallow their own errors;
/// the orchestrator never fails a deployment over a sink problem.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish a completion event
    async fn publish(&self, event: DeploymentEvent);
}

/// Sink that drops every event, for callers that don't care
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: DeploymentEvent) {}
}

/// Deployment workflow metrics
///
/// Plain atomics so concurrent deployments can record without locking;
/// scraped or logged by the embedding service.
#[derive(Debug, Default)]
pub struct DeployMetrics {
    /// Total deploy invocations
    pub deployments_total: AtomicU64,
    /// Deployments that reached Healthy
    pub succeeded_total: AtomicU64,
    /// Deployments that failed
    pub failed_total: AtomicU64,
    /// Compensation passes run
    pub rollbacks_total: AtomicU64,
    /// Optional-resource creations that failed (degraded monitoring)
    pub optional_failures_total: AtomicU64,
    /// Accumulated workflow duration in milliseconds
    pub duration_ms_total: AtomicU64,
}

impl DeployMetrics {
    /// Create a fresh metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployment that reached Healthy
    pub fn record_success(&self, duration: Duration) {
        self.deployments_total.fetch_add(1, Ordering::Relaxed);
        self.succeeded_total.fetch_add(1, Ordering::Relaxed);
        self.duration_ms_total
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed deployment
    pub fn record_failure(&self, duration: Duration) {
        self.deployments_total.fetch_add(1, Ordering::Relaxed);
        self.failed_total.fetch_add(1, Ordering::Relaxed);
        self.duration_ms_total
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a compensation pass
    pub fn record_rollback(&self) {
        self.rollbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tolerated optional-resource failure
    pub fn record_optional_failure(&self) {
        self.optional_failures_total.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serialization() {
        assert_eq!(
            serde_json::to_value(DeployPhase::CreatingMandatory).unwrap(),
            "creatingMandatory"
        );
        assert_eq!(DeployPhase::WaitingReady.to_string(), "waitingReady");
        assert_eq!(DeployPhase::default(), DeployPhase::Pending);
    }

    #[test]
    fn metrics_accumulate() {
        let metrics = DeployMetrics::new();
        metrics.record_success(Duration::from_millis(1500));
        metrics.record_failure(Duration::from_millis(500));
        metrics.record_rollback();
        metrics.record_optional_failure();

        assert_eq!(metrics.deployments_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.succeeded_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failed_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rollbacks_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.optional_failures_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.duration_ms_total.load(Ordering::Relaxed), 2000);
    }
}
