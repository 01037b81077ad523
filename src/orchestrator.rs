//! Deployment orchestrator: the saga driving a deploy to a terminal state
//!
//! One deploy invocation is one sequential async pipeline:
//! validate → resolve artifact → name-check → build manifests → create
//! mandatory resources → create optional resources → wait for readiness.
//! Mandatory failures trigger exactly one best-effort compensation pass and
//! propagate the original error; optional failures degrade the outcome
//! without failing it. Collaborators are injected handles, so concurrent
//! deployments for different names share no in-process mutable state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::artifact::ModelRegistry;
use crate::cluster::{ClusterAdapter, ControlPlane, WorkloadStatus};
use crate::events::{
    DeployMetrics, DeployOutcome, DeployPhase, DeploymentEvent, EventSink, NullEventSink,
    PhaseTransition,
};
use crate::manifest::{ManifestBuilder, ResourceSet};
use crate::readiness::{ReadinessPoller, DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT};
use crate::request::DeployRequest;
use crate::retry::RetryPolicy;
use crate::rollback::CompensationRunner;
use crate::Error;

/// Buffer size for the phase-transition channel
const PHASE_CHANNEL_CAPACITY: usize = 32;

/// Coarse lifecycle status reported in a [`DeploymentOutcome`]
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentStatus {
    /// Nothing has happened yet
    #[default]
    Pending,
    /// Resources are being created
    Creating,
    /// Waiting for replicas to become ready
    WaitingReady,
    /// Serving traffic (terminal)
    Healthy,
    /// Deployment failed (terminal, reachable from any non-terminal state)
    Failed,
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Creating => write!(f, "creating"),
            Self::WaitingReady => write!(f, "waitingReady"),
            Self::Healthy => write!(f, "healthy"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a successful deploy invocation
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    /// Deployment id, stable per (tenant, name)
    pub id: String,
    /// URL prediction traffic is served at
    pub endpoint_url: String,
    /// Lifecycle status; `Healthy` on the success path
    pub status: DeploymentStatus,
    /// Replica counts observed after readiness
    pub replicas: WorkloadStatus,
    /// When readiness was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    /// Tolerated optional-resource failures (degraded monitoring)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Base URL prediction endpoints are assembled under
    pub base_url: String,
    /// Readiness deadline for [`Orchestrator::deploy`]
    pub ready_timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
    /// Retry budget applied to every control-plane call
    pub retry_policy: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.berth.dev".to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// The deployment saga
///
/// Construct one per service instance and share it: `deploy` takes `&self`
/// and concurrent invocations are independent pipelines.
pub struct Orchestrator {
    adapter: ClusterAdapter,
    registry: Arc<dyn ModelRegistry>,
    poller: ReadinessPoller,
    compensation: CompensationRunner,
    sink: Arc<dyn EventSink>,
    metrics: Arc<DeployMetrics>,
    config: OrchestratorConfig,
    phase_tx: Option<mpsc::Sender<PhaseTransition>>,
}

impl Orchestrator {
    /// Create an orchestrator over injected collaborators
    pub fn new(
        client: Arc<dyn ControlPlane>,
        registry: Arc<dyn ModelRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let adapter = ClusterAdapter::with_policy(client, config.retry_policy.clone());
        let poller = ReadinessPoller::with_interval(adapter.clone(), config.poll_interval);
        let compensation = CompensationRunner::new(adapter.clone());
        Self {
            adapter,
            registry,
            poller,
            compensation,
            sink: Arc::new(NullEventSink),
            metrics: Arc::new(DeployMetrics::new()),
            config,
            phase_tx: None,
        }
    }

    /// Attach a sink for completion events
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Open a stream of phase transitions for all deployments run through
    /// this orchestrator.
    ///
    /// Emission is fire-and-forget: transitions are dropped when the
    /// consumer falls more than the channel buffer behind.
    pub fn phase_stream(&mut self) -> ReceiverStream<PhaseTransition> {
        let (tx, rx) = mpsc::channel(PHASE_CHANNEL_CAPACITY);
        self.phase_tx = Some(tx);
        ReceiverStream::new(rx)
    }

    /// Workflow metrics handle
    pub fn metrics(&self) -> Arc<DeployMetrics> {
        self.metrics.clone()
    }

    /// Deploy with the configured readiness timeout
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeploymentOutcome, Error> {
        self.deploy_with_timeout(request, self.config.ready_timeout)
            .await
    }

    /// Deploy with a caller-supplied readiness timeout
    pub async fn deploy_with_timeout(
        &self,
        request: DeployRequest,
        ready_timeout: Duration,
    ) -> Result<DeploymentOutcome, Error> {
        let started = Instant::now();
        let deployment_id = deployment_id(&request);

        info!(
            deployment = %deployment_id,
            model = %request.model_id,
            tenant = %request.tenant_id,
            "Starting deployment"
        );

        let result = self.run(&request, &deployment_id, ready_timeout).await;
        let duration = started.elapsed();

        let outcome_label = match &result {
            Ok(_) => {
                self.metrics.record_success(duration);
                DeployOutcome::Succeeded
            }
            Err(e) => {
                self.emit_phase(&deployment_id, DeployPhase::Failed);
                self.metrics.record_failure(duration);
                warn!(
                    deployment = %deployment_id,
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Deployment failed"
                );
                DeployOutcome::Failed
            }
        };

        // Fire-and-forget: the sink must not fail the deployment
        self.sink
            .publish(DeploymentEvent {
                model_id: request.model_id.clone(),
                tenant_id: request.tenant_id.clone(),
                deployment_id,
                duration,
                outcome: outcome_label,
            })
            .await;

        result
    }

    async fn run(
        &self,
        request: &DeployRequest,
        deployment_id: &str,
        ready_timeout: Duration,
    ) -> Result<DeploymentOutcome, Error> {
        let name = &request.config.name;
        let namespace = request.namespace();

        // Phase 1: validate. Failing here has had no remote effect.
        self.emit_phase(deployment_id, DeployPhase::Validating);
        request.validate()?;

        let artifact = self
            .registry
            .get_artifact(&request.model_id, &request.tenant_id)
            .await?
            .ok_or_else(|| Error::ArtifactNotFound {
                model_id: request.model_id.clone(),
                tenant_id: request.tenant_id.clone(),
            })?;
        if !artifact.status.is_deployable() {
            return Err(Error::ArtifactNotDeployable {
                model_id: request.model_id.clone(),
                status: artifact.status.to_string(),
            });
        }

        // Phase 2: name uniqueness. Relies on the control plane's
        // read-after-write guarantee; no additional locking here.
        self.emit_phase(deployment_id, DeployPhase::NameCheck);
        if self.adapter.get_workload(&namespace, name).await?.is_some() {
            return Err(Error::duplicate_name(name, namespace));
        }

        // Phase 3: manifests. Pure, still pre-creation.
        let resources = ManifestBuilder::build(&artifact, &request.tenant_id, &request.config)?;

        // Phases 4-6: the only section that can leave partial state behind.
        // Any failure in it triggers the single compensation pass and the
        // original error is the one the caller sees.
        let mut warnings = Vec::new();
        match self
            .create_and_wait(request, deployment_id, &resources, ready_timeout, &mut warnings)
            .await
        {
            Ok(ready_at) => {
                let replicas = self.observed_replicas(&namespace, name, request).await;
                info!(
                    deployment = %deployment_id,
                    ready = replicas.ready_replicas,
                    "Deployment healthy"
                );
                self.emit_phase(deployment_id, DeployPhase::Healthy);
                Ok(DeploymentOutcome {
                    id: deployment_id.to_string(),
                    endpoint_url: self.endpoint_url(request),
                    status: DeploymentStatus::Healthy,
                    replicas,
                    ready_at: Some(ready_at),
                    warnings,
                })
            }
            Err(original) => {
                self.metrics.record_rollback();
                let report = self.compensation.rollback(&namespace, name).await;
                if !report.is_clean() {
                    warn!(
                        deployment = %deployment_id,
                        failed_deletes = report.failed.len(),
                        "Rollback left resources behind"
                    );
                }
                Err(original)
            }
        }
    }

    /// Create all resources and wait for readiness.
    ///
    /// Every error path out of this function is a mandatory-phase failure;
    /// the caller owns the one compensation pass.
    async fn create_and_wait(
        &self,
        request: &DeployRequest,
        deployment_id: &str,
        resources: &ResourceSet,
        ready_timeout: Duration,
        warnings: &mut Vec<String>,
    ) -> Result<DateTime<Utc>, Error> {
        let name = &request.config.name;
        let namespace = request.namespace();

        self.emit_phase(deployment_id, DeployPhase::CreatingMandatory);
        self.adapter.ensure_namespace(&namespace).await?;
        for resource in resources.mandatory() {
            debug!(
                deployment = %deployment_id,
                kind = %resource.kind(),
                "Creating mandatory resource"
            );
            self.adapter.apply(&namespace, resource).await?;
        }

        self.emit_phase(deployment_id, DeployPhase::CreatingOptional);
        for resource in resources.optional() {
            if let Err(e) = self.adapter.apply(&namespace, resource).await {
                // Tolerated: the deployment proceeds with degraded monitoring
                warn!(
                    deployment = %deployment_id,
                    kind = %resource.kind(),
                    error = %e,
                    "Optional resource creation failed, continuing"
                );
                self.metrics.record_optional_failure();
                warnings.push(format!("{} creation failed: {}", resource.kind(), e));
            }
        }

        self.emit_phase(deployment_id, DeployPhase::WaitingReady);
        let ready_at = self
            .poller
            .wait_until_ready(&namespace, name, ready_timeout)
            .await?;
        Ok(ready_at)
    }

    /// Best-effort read of the final replica counts.
    ///
    /// Readiness was already observed; a failed read here falls back to the
    /// requested counts rather than failing the deployment.
    async fn observed_replicas(
        &self,
        namespace: &str,
        name: &str,
        request: &DeployRequest,
    ) -> WorkloadStatus {
        match self.adapter.get_workload(namespace, name).await {
            Ok(Some(status)) => status,
            Ok(None) | Err(_) => {
                debug!(workload = %name, "Final status read failed, using requested counts");
                WorkloadStatus {
                    desired_replicas: request.config.replicas.min,
                    ready_replicas: request.config.replicas.min,
                    available_replicas: request.config.replicas.min,
                }
            }
        }
    }

    fn endpoint_url(&self, request: &DeployRequest) -> String {
        format!(
            "{}/v1/tenants/{}/deployments/{}/predict",
            self.config.base_url.trim_end_matches('/'),
            request.tenant_id,
            request.config.name
        )
    }

    fn emit_phase(&self, deployment_id: &str, phase: DeployPhase) {
        if let Some(tx) = &self.phase_tx {
            // Fire-and-forget: a slow or absent consumer drops transitions
            let _ = tx.try_send(PhaseTransition {
                deployment_id: deployment_id.to_string(),
                phase,
                at: Utc::now(),
            });
        }
    }
}

/// Stable deployment id for a request
fn deployment_id(request: &DeployRequest) -> String {
    format!("{}-{}", request.tenant_id, request.config.name)
}
