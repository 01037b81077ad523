//! Desired-state resource descriptions and the manifest builder
//!
//! This module defines the cluster resource types a deployment is made of and
//! the pure builder that derives them from an artifact plus a target config:
//! - Workload: the model-serving containers (mandatory)
//! - Endpoint: network exposure for prediction traffic (mandatory)
//! - Autoscaler: replica scaling policy (optional)
//! - ScrapeConfig: metrics collection (optional)
//! - AlertRules: alerting on the serving workload (optional)
//!
//! Resources are a tagged enum so downstream code (notably the compensation
//! runner) can exhaustively match over kinds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::{Framework, ModelArtifact};
use crate::request::TargetConfig;
use crate::Error;

/// Floor for derived CPU requests, in cores
pub const MIN_CPU_REQUEST_CORES: f64 = 0.1;
/// Fraction of the CPU limit granted as request
pub const CPU_REQUEST_FRACTION: f64 = 0.5;
/// Floor for derived memory requests, in MiB
pub const MIN_MEMORY_REQUEST_MIB: f64 = 128.0;
/// Fraction of the memory limit granted as request
pub const MEMORY_REQUEST_FRACTION: f64 = 0.75;

/// Readiness probe initial delay (fixed, not caller-configurable)
pub const READINESS_INITIAL_DELAY_SECONDS: u32 = 10;
/// Readiness probe period
pub const READINESS_PERIOD_SECONDS: u32 = 5;
/// Readiness probe failure threshold
pub const READINESS_FAILURE_THRESHOLD: u32 = 3;

/// Port the endpoint exposes to callers
pub const ENDPOINT_PORT: u16 = 80;
/// Metrics scrape interval
pub const SCRAPE_INTERVAL_SECONDS: u32 = 15;

/// Registry prefix for the per-framework model server images
const SERVING_IMAGE_REPO: &str = "registry.berth.dev/serving";

// =============================================================================
// Resource Kinds
// =============================================================================

/// The kinds of cluster resource a deployment can own
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// Model-serving workload (mandatory)
    Workload,
    /// Network endpoint for prediction traffic (mandatory)
    Endpoint,
    /// Autoscaling policy (optional)
    Autoscaler,
    /// Metrics-scrape configuration (optional)
    ScrapeConfig,
    /// Alert rules (optional)
    AlertRules,
}

impl ResourceKind {
    /// Every kind a deployment could have created, in creation order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Workload,
        ResourceKind::Endpoint,
        ResourceKind::Autoscaler,
        ResourceKind::ScrapeConfig,
        ResourceKind::AlertRules,
    ];

    /// Whether a creation failure for this kind aborts the deployment
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Workload | Self::Endpoint)
    }

    /// The name a resource of this kind carries for a given deployment name
    pub fn resource_name(self, deployment: &str) -> String {
        match self {
            Self::Workload | Self::Endpoint | Self::Autoscaler => deployment.to_string(),
            Self::ScrapeConfig => format!("{deployment}-metrics"),
            Self::AlertRules => format!("{deployment}-alerts"),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workload => write!(f, "workload"),
            Self::Endpoint => write!(f, "endpoint"),
            Self::Autoscaler => write!(f, "autoscaler"),
            Self::ScrapeConfig => write!(f, "scrapeConfig"),
            Self::AlertRules => write!(f, "alertRules"),
        }
    }
}

// =============================================================================
// Resource Types
// =============================================================================

/// Common metadata shared by all resources
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    /// Resource name
    pub name: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Create metadata with the standard managed-by labels
    pub fn new(name: impl Into<String>, deployment: &str, tenant_id: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), deployment.to_string());
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            "berth".to_string(),
        );
        labels.insert("berth.dev/tenant".to_string(), tenant_id.to_string());
        Self {
            name: name.into(),
            labels,
        }
    }
}

/// Environment variable injected into the serving container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

/// Probe attached to the serving container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// HTTP path probed
    pub path: String,
    /// Container port probed
    pub port: u16,
    /// Seconds before the first probe
    pub initial_delay_seconds: u32,
    /// Seconds between probes
    pub period_seconds: u32,
    /// Consecutive failures before the probe trips
    pub failure_threshold: u32,
}

/// CPU/memory/GPU quantities for one side of the resource contract
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantities {
    /// CPU, in cores
    pub cpu: String,
    /// Memory, with unit suffix
    pub memory: String,
    /// GPU count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
}

/// Requests and limits for the serving container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Guaranteed resources
    pub requests: ResourceQuantities,
    /// Hard caps
    pub limits: ResourceQuantities,
}

/// Container spec for the serving workload
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Serving image
    pub image: String,
    /// Port the model server listens on
    pub port: u16,
    /// Environment describing the artifact
    pub env: Vec<EnvVar>,
    /// Resource requests and limits
    pub resources: ResourceRequirements,
    /// Liveness probe (from the caller's health check config)
    pub liveness_probe: Probe,
    /// Readiness probe (fixed defaults)
    pub readiness_probe: Probe,
}

/// Model-serving workload (mandatory)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Metadata
    pub meta: ResourceMeta,
    /// Desired replica count
    pub replicas: u32,
    /// Serving container
    pub container: ContainerSpec,
}

/// Network endpoint for prediction traffic (mandatory)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Metadata
    pub meta: ResourceMeta,
    /// Exposed port
    pub port: u16,
    /// Container port traffic is forwarded to
    pub target_port: u16,
}

/// Autoscaling policy resource (optional)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaler {
    /// Metadata
    pub meta: ResourceMeta,
    /// Minimum replicas
    pub min_replicas: u32,
    /// Maximum replicas
    pub max_replicas: u32,
    /// Target average CPU utilization percentage
    pub target_cpu_utilization: u32,
}

/// Metrics-scrape configuration resource (optional)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeConfig {
    /// Metadata
    pub meta: ResourceMeta,
    /// Metrics path
    pub path: String,
    /// Metrics port
    pub port: u16,
    /// Scrape interval
    pub interval_seconds: u32,
}

/// One alert rule
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Rule name
    pub name: String,
    /// Alert expression
    pub expr: String,
    /// Seconds the condition must hold before firing
    pub for_seconds: u32,
    /// Severity label
    pub severity: String,
}

/// Alert rules resource (optional)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRules {
    /// Metadata
    pub meta: ResourceMeta,
    /// Rules
    pub rules: Vec<AlertRule>,
}

/// A desired-state resource, tagged by kind
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Resource {
    /// Model-serving workload
    Workload(Workload),
    /// Network endpoint
    Endpoint(Endpoint),
    /// Autoscaling policy
    Autoscaler(Autoscaler),
    /// Metrics-scrape configuration
    ScrapeConfig(ScrapeConfig),
    /// Alert rules
    AlertRules(AlertRules),
}

impl Resource {
    /// The kind tag for this resource
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Workload(_) => ResourceKind::Workload,
            Self::Endpoint(_) => ResourceKind::Endpoint,
            Self::Autoscaler(_) => ResourceKind::Autoscaler,
            Self::ScrapeConfig(_) => ResourceKind::ScrapeConfig,
            Self::AlertRules(_) => ResourceKind::AlertRules,
        }
    }

    /// Resource name
    pub fn name(&self) -> &str {
        match self {
            Self::Workload(r) => &r.meta.name,
            Self::Endpoint(r) => &r.meta.name,
            Self::Autoscaler(r) => &r.meta.name,
            Self::ScrapeConfig(r) => &r.meta.name,
            Self::AlertRules(r) => &r.meta.name,
        }
    }

    /// Whether a creation failure for this resource aborts the deployment
    pub fn is_mandatory(&self) -> bool {
        self.kind().is_mandatory()
    }
}

/// Ordered set of resources for one deployment
///
/// Immutable once built. Mandatory resources always precede optional ones;
/// the orchestrator creates them in this order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceSet {
    resources: Vec<Resource>,
}

impl ResourceSet {
    /// Iterate resources in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// The mandatory resources, in creation order
    pub fn mandatory(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_mandatory())
    }

    /// The optional resources, in creation order
    pub fn optional(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.is_mandatory())
    }

    /// Number of resources in the set
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

// =============================================================================
// Manifest Builder
// =============================================================================

/// Pure builder deriving a [`ResourceSet`] from artifact + config
///
/// Deterministic, no I/O. Fails only when a required config field cannot be
/// interpreted (bad resource quantities).
pub struct ManifestBuilder;

impl ManifestBuilder {
    /// Build the desired-state resource set for one deployment
    pub fn build(
        artifact: &ModelArtifact,
        tenant_id: &str,
        config: &TargetConfig,
    ) -> Result<ResourceSet, Error> {
        let name = &config.name;
        let mut resources = Vec::new();

        resources.push(Resource::Workload(Self::build_workload(
            artifact, tenant_id, config,
        )?));
        resources.push(Resource::Endpoint(Self::build_endpoint(tenant_id, config)));

        if config.autoscaling.enabled {
            resources.push(Resource::Autoscaler(Autoscaler {
                meta: ResourceMeta::new(
                    ResourceKind::Autoscaler.resource_name(name),
                    name,
                    tenant_id,
                ),
                min_replicas: config.replicas.min,
                max_replicas: config.replicas.max,
                target_cpu_utilization: config.autoscaling.target_cpu_utilization.unwrap_or(80),
            }));
        }

        if config.monitoring.enabled {
            resources.push(Resource::ScrapeConfig(ScrapeConfig {
                meta: ResourceMeta::new(
                    ResourceKind::ScrapeConfig.resource_name(name),
                    name,
                    tenant_id,
                ),
                path: "/metrics".to_string(),
                port: config.health_check.port,
                interval_seconds: SCRAPE_INTERVAL_SECONDS,
            }));

            if config.monitoring.alerting {
                resources.push(Resource::AlertRules(Self::build_alert_rules(
                    tenant_id, config,
                )));
            }
        }

        Ok(ResourceSet { resources })
    }

    fn build_workload(
        artifact: &ModelArtifact,
        tenant_id: &str,
        config: &TargetConfig,
    ) -> Result<Workload, Error> {
        let name = &config.name;
        let limits = &config.resources;

        let requests = ResourceQuantities {
            cpu: cpu_request_from_limit(&limits.cpu)?,
            memory: memory_request_from_limit(&limits.memory)?,
            gpu: None,
        };
        let limits = ResourceQuantities {
            cpu: limits.cpu.clone(),
            memory: limits.memory.clone(),
            gpu: limits.gpu,
        };

        let env = vec![
            EnvVar {
                name: "MODEL_ID".to_string(),
                value: artifact.id.clone(),
            },
            EnvVar {
                name: "MODEL_VERSION".to_string(),
                value: artifact.version.clone(),
            },
            EnvVar {
                name: "MODEL_PATH".to_string(),
                value: artifact.storage_path.clone(),
            },
            EnvVar {
                name: "MODEL_FRAMEWORK".to_string(),
                value: artifact.framework.to_string(),
            },
            EnvVar {
                name: "TENANT_ID".to_string(),
                value: tenant_id.to_string(),
            },
        ];

        let hc = &config.health_check;
        let liveness_probe = Probe {
            path: hc.path.clone(),
            port: hc.port,
            initial_delay_seconds: hc.initial_delay_seconds,
            period_seconds: hc.period_seconds,
            failure_threshold: hc.failure_threshold,
        };
        let readiness_probe = Probe {
            path: hc.path.clone(),
            port: hc.port,
            initial_delay_seconds: READINESS_INITIAL_DELAY_SECONDS,
            period_seconds: READINESS_PERIOD_SECONDS,
            failure_threshold: READINESS_FAILURE_THRESHOLD,
        };

        Ok(Workload {
            meta: ResourceMeta::new(ResourceKind::Workload.resource_name(name), name, tenant_id),
            replicas: config.replicas.min,
            container: ContainerSpec {
                image: serving_image(artifact.framework),
                port: hc.port,
                env,
                resources: ResourceRequirements { requests, limits },
                liveness_probe,
                readiness_probe,
            },
        })
    }

    fn build_endpoint(tenant_id: &str, config: &TargetConfig) -> Endpoint {
        let name = &config.name;
        Endpoint {
            meta: ResourceMeta::new(ResourceKind::Endpoint.resource_name(name), name, tenant_id),
            port: ENDPOINT_PORT,
            target_port: config.health_check.port,
        }
    }

    fn build_alert_rules(tenant_id: &str, config: &TargetConfig) -> AlertRules {
        let name = &config.name;
        AlertRules {
            meta: ResourceMeta::new(ResourceKind::AlertRules.resource_name(name), name, tenant_id),
            rules: vec![
                AlertRule {
                    name: format!("{name}-high-error-rate"),
                    expr: format!(
                        "rate(model_request_errors_total{{deployment=\"{name}\"}}[5m]) > 0.05"
                    ),
                    for_seconds: 300,
                    severity: "warning".to_string(),
                },
                AlertRule {
                    name: format!("{name}-replicas-unavailable"),
                    expr: format!(
                        "model_replicas_available{{deployment=\"{name}\"}} < model_replicas_desired{{deployment=\"{name}\"}}"
                    ),
                    for_seconds: 600,
                    severity: "critical".to_string(),
                },
            ],
        }
    }
}

/// Serving image for a framework
fn serving_image(framework: Framework) -> String {
    format!("{SERVING_IMAGE_REPO}/{framework}-server:latest")
}

// =============================================================================
// Quantity Derivation
// =============================================================================

/// Derive the CPU request from a CPU limit
///
/// Accepts cores ("2", "1.5") or millicores ("500m"); emits cores. The
/// request is half the limit, floored at [`MIN_CPU_REQUEST_CORES`].
pub fn cpu_request_from_limit(limit: &str) -> Result<String, Error> {
    let cores = parse_cpu_cores(limit)?;
    let request = (CPU_REQUEST_FRACTION * cores).max(MIN_CPU_REQUEST_CORES);
    Ok(format_quantity(request))
}

/// Derive the memory request from a memory limit
///
/// The request is three quarters of the limit, floored at
/// [`MIN_MEMORY_REQUEST_MIB`], expressed in the limit's own unit suffix.
pub fn memory_request_from_limit(limit: &str) -> Result<String, Error> {
    let (value, suffix) = split_quantity(limit)?;
    let mib_per_unit = match suffix {
        "Ki" => 1.0 / 1024.0,
        "Mi" => 1.0,
        "Gi" => 1024.0,
        "Ti" => 1024.0 * 1024.0,
        _ => {
            return Err(Error::validation(format!(
                "unsupported memory unit '{suffix}' in limit '{limit}'"
            )))
        }
    };

    let request = MEMORY_REQUEST_FRACTION * value;
    let floor_in_unit = MIN_MEMORY_REQUEST_MIB / mib_per_unit;
    let request = request.max(floor_in_unit);
    Ok(format!("{}{}", format_quantity(request), suffix))
}

fn parse_cpu_cores(s: &str) -> Result<f64, Error> {
    let parse = |v: &str| {
        v.parse::<f64>()
            .map_err(|_| Error::validation(format!("invalid cpu quantity '{s}'")))
    };
    let cores = match s.strip_suffix('m') {
        Some(milli) => parse(milli)? / 1000.0,
        None => parse(s)?,
    };
    if cores <= 0.0 {
        return Err(Error::validation(format!(
            "cpu quantity '{s}' must be positive"
        )));
    }
    Ok(cores)
}

fn split_quantity(s: &str) -> Result<(f64, &str), Error> {
    let split_at = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, suffix) = s.split_at(split_at);
    let value = num
        .parse::<f64>()
        .map_err(|_| Error::validation(format!("invalid memory quantity '{s}'")))?;
    if value <= 0.0 {
        return Err(Error::validation(format!(
            "memory quantity '{s}' must be positive"
        )));
    }
    Ok((value, suffix))
}

/// Format a quantity without trailing zeros ("1", "0.75", "128")
fn format_quantity(v: f64) -> String {
    // Round to 3 decimal places to avoid float noise in manifests
    let rounded = (v * 1000.0).round() / 1000.0;
    let mut s = format!("{rounded}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}
