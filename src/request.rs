//! Deployment request types and validation
//!
//! A [`DeployRequest`] is created once per deploy invocation and is immutable
//! for the lifetime of the workflow. Validation runs before any remote call:
//! a request that fails here has had no effect on the cluster.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Target environment for a deployment
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment (stricter invariants apply)
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Replica bounds for the serving workload
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaBounds {
    /// Minimum (and initial) replica count
    pub min: u32,
    /// Maximum replica count the autoscaler may reach
    pub max: u32,
}

/// Resource limits for the serving container
///
/// Requests are not caller-configurable; they are derived from these limits
/// by fixed policy fractions in the manifest builder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// CPU limit, in cores ("2") or millicores ("500m")
    pub cpu: String,
    /// Memory limit with unit suffix ("512Mi", "2Gi")
    pub memory: String,
    /// GPU count, when the model needs accelerators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
}

/// Health check parameters for the serving container's liveness probe
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// HTTP path probed for liveness
    pub path: String,
    /// Container port the probe hits
    pub port: u16,
    /// Seconds to wait before the first probe
    pub initial_delay_seconds: u32,
    /// Seconds between probes
    pub period_seconds: u32,
    /// Consecutive failures before the container is restarted
    pub failure_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/healthz".to_string(),
            port: 8080,
            initial_delay_seconds: 15,
            period_seconds: 10,
            failure_threshold: 3,
        }
    }
}

/// Autoscaling policy for the deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicy {
    /// Whether an autoscaler resource is created at all
    pub enabled: bool,
    /// Target average CPU utilization percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization: Option<u32>,
}

/// Monitoring flags for the deployment
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringFlags {
    /// Whether a metrics-scrape config is created
    pub enabled: bool,
    /// Whether alert rules are created (requires `enabled`)
    pub alerting: bool,
}

/// Desired-state configuration for one deployment
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Deployment name; all derived resources share it
    pub name: String,
    /// Target environment
    #[serde(default)]
    pub environment: Environment,
    /// Replica bounds
    pub replicas: ReplicaBounds,
    /// Container resource limits
    pub resources: ResourceLimits,
    /// Liveness health check
    #[serde(default)]
    pub health_check: HealthCheck,
    /// Autoscaling policy
    #[serde(default)]
    pub autoscaling: AutoscalingPolicy,
    /// Monitoring flags
    #[serde(default)]
    pub monitoring: MonitoringFlags,
}

/// A single deploy invocation
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Tenant that owns the model and the deployment
    pub tenant_id: String,
    /// Model whose latest artifact is deployed
    pub model_id: String,
    /// Desired-state configuration
    pub config: TargetConfig,
}

impl DeployRequest {
    /// Namespace this deployment lands in, one per tenant
    pub fn namespace(&self) -> String {
        format!("tenant-{}", self.tenant_id)
    }

    /// Validate the request invariants
    ///
    /// Runs before any remote call. A request rejected here has had no
    /// effect on the cluster and needs no compensation.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tenant_id.is_empty() {
            return Err(Error::validation("tenantId must not be empty"));
        }
        if self.model_id.is_empty() {
            return Err(Error::validation("modelId must not be empty"));
        }
        self.config.validate()
    }
}

impl TargetConfig {
    /// Validate the configuration invariants
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;

        if self.replicas.min < 1 {
            return Err(Error::validation("minReplicas must be at least 1"));
        }
        if self.replicas.max < self.replicas.min {
            return Err(Error::validation(
                "maxReplicas must be greater than or equal to minReplicas",
            ));
        }
        if self.environment == Environment::Production {
            if self.replicas.min < 2 {
                return Err(Error::validation(
                    "production deployments require at least 2 replicas",
                ));
            }
            if !self.monitoring.enabled {
                return Err(Error::validation(
                    "production deployments require monitoring to be enabled",
                ));
            }
        }
        if self.resources.cpu.is_empty() {
            return Err(Error::validation("cpu limit must not be empty"));
        }
        if self.resources.memory.is_empty() {
            return Err(Error::validation("memory limit must not be empty"));
        }
        Ok(())
    }
}

/// Validate a deployment name as a DNS-1123 label
///
/// Resource names derived from it (e.g. "<name>-alerts") must themselves be
/// valid names, so the base name is capped below the 63-character limit.
fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::validation("deployment name must not be empty"));
    }
    if name.len() > 53 {
        return Err(Error::validation(
            "deployment name must be at most 53 characters",
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(Error::validation(format!(
            "deployment name '{}' must consist of lowercase alphanumeric characters or '-', \
             and must start and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(name: &str) -> DeployRequest {
        DeployRequest {
            tenant_id: "acme".to_string(),
            model_id: "churn-predictor".to_string(),
            config: TargetConfig {
                name: name.to_string(),
                environment: Environment::Development,
                replicas: ReplicaBounds { min: 1, max: 3 },
                resources: ResourceLimits {
                    cpu: "2".to_string(),
                    memory: "1Gi".to_string(),
                    gpu: None,
                },
                health_check: HealthCheck::default(),
                autoscaling: AutoscalingPolicy::default(),
                monitoring: MonitoringFlags::default(),
            },
        }
    }

    // =========================================================================
    // Story: Replica Bounds
    // =========================================================================

    #[test]
    fn story_valid_request_passes() {
        assert!(make_request("churn-v1").validate().is_ok());
    }

    #[test]
    fn story_zero_min_replicas_rejected() {
        let mut req = make_request("churn-v1");
        req.config.replicas = ReplicaBounds { min: 0, max: 3 };
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn story_max_below_min_rejected() {
        let mut req = make_request("churn-v1");
        req.config.replicas = ReplicaBounds { min: 3, max: 2 };
        assert!(req.validate().is_err());
    }

    // =========================================================================
    // Story: Production Hardening
    // =========================================================================
    //
    // Production deployments must survive a single replica loss and must be
    // observable, so single-replica or unmonitored configs are rejected
    // before any remote call is made.

    #[test]
    fn story_production_requires_two_replicas() {
        let mut req = make_request("churn-v1");
        req.config.environment = Environment::Production;
        req.config.replicas = ReplicaBounds { min: 1, max: 3 };
        req.config.monitoring.enabled = true;
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("at least 2 replicas"));
    }

    #[test]
    fn story_production_requires_monitoring() {
        let mut req = make_request("churn-v1");
        req.config.environment = Environment::Production;
        req.config.replicas = ReplicaBounds { min: 2, max: 4 };
        req.config.monitoring.enabled = false;
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("monitoring"));
    }

    #[test]
    fn story_hardened_production_config_passes() {
        let mut req = make_request("churn-v1");
        req.config.environment = Environment::Production;
        req.config.replicas = ReplicaBounds { min: 2, max: 10 };
        req.config.monitoring = MonitoringFlags {
            enabled: true,
            alerting: true,
        };
        assert!(req.validate().is_ok());
    }

    // =========================================================================
    // Story: Name Validation
    // =========================================================================

    #[test]
    fn story_invalid_names_rejected() {
        for name in ["", "My Model", "UPPER", "-edge", "edge-", "a".repeat(54).as_str()] {
            let req = make_request(name);
            assert!(req.validate().is_err(), "name {:?} should be rejected", name);
        }
    }

    #[test]
    fn story_valid_names_accepted() {
        for name in ["m", "churn-v1", "fraud-detector-2"] {
            assert!(make_request(name).validate().is_ok());
        }
    }

    #[test]
    fn story_namespace_derived_from_tenant() {
        assert_eq!(make_request("churn-v1").namespace(), "tenant-acme");
    }

    // =========================================================================
    // Story: Wire Format
    // =========================================================================

    #[test]
    fn story_request_round_trips_camel_case() {
        let req = make_request("churn-v1");
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tenantId").is_some());
        assert!(json["config"].get("healthCheck").is_some());
        assert_eq!(json["config"]["environment"], "development");

        let back: DeployRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }
}
