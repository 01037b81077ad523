//! Error types for deployment orchestration

use std::time::Duration;

use thiserror::Error;

/// Status codes that are never retried.
///
/// These are client errors: retrying the same call cannot succeed until the
/// caller changes the request.
pub const NON_RETRYABLE_STATUS_CODES: [u16; 5] = [400, 401, 403, 404, 409];

/// Error returned by control-plane operations.
///
/// Carries the remote status code when one is available so the retry
/// executor can classify the failure as transient or terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneError {
    /// Remote status code, when the control plane returned one
    pub code: Option<u16>,
    /// Human-readable failure description
    pub message: String,
}

impl std::fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "control plane error (status {}): {}", code, self.message),
            None => write!(f, "control plane error: {}", self.message),
        }
    }
}

impl std::error::Error for ControlPlaneError {}

impl ControlPlaneError {
    /// Create an error carrying a remote status code
    pub fn with_code(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: msg.into(),
        }
    }

    /// Create an error without a status code (network failure, timeout, ...)
    pub fn transient(msg: impl Into<String>) -> Self {
        Self {
            code: None,
            message: msg.into(),
        }
    }

    /// Whether the retry executor must surface this error without retrying
    pub fn is_terminal(&self) -> bool {
        self.code
            .is_some_and(|c| NON_RETRYABLE_STATUS_CODES.contains(&c))
    }

    /// Whether this error is the control plane reporting an absent resource
    pub fn is_not_found(&self) -> bool {
        self.code == Some(404)
    }
}

/// Main error type for deployment operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Request shape or configuration is invalid; no remote call was made
    #[error("validation error: {0}")]
    Validation(String),

    /// A workload with the requested name already exists in the namespace
    #[error("deployment '{name}' already exists in namespace '{namespace}'")]
    DuplicateName {
        /// Requested deployment name
        name: String,
        /// Target namespace
        namespace: String,
    },

    /// Control-plane call failed (after retries, or terminally)
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Workload did not become ready before the deadline
    #[error("deployment '{name}' not ready after {}s", waited.as_secs())]
    Timeout {
        /// Deployment name that was being waited on
        name: String,
        /// How long the poller waited before giving up
        waited: Duration,
    },

    /// No artifact exists for the requested model
    #[error("model '{model_id}' not found for tenant '{tenant_id}'")]
    ArtifactNotFound {
        /// Requested model id
        model_id: String,
        /// Owning tenant
        tenant_id: String,
    },

    /// Artifact exists but is not in a deployable state
    #[error("model '{model_id}' is not deployable (status: {status})")]
    ArtifactNotDeployable {
        /// Requested model id
        model_id: String,
        /// The artifact's current lifecycle status
        status: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a duplicate-name error for the given resource
    pub fn duplicate_name(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::DuplicateName {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a readiness timeout error
    pub fn timeout(name: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            name: name.into(),
            waited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Classification in the Deploy Pipeline
    // ==========================================================================
    //
    // Each error category drives a different branch of the saga: validation
    // errors fail before any remote call, terminal control-plane errors skip
    // the retry loop, transient ones consume the retry budget.

    /// Story: client-error status codes are never retried
    #[test]
    fn story_client_errors_are_terminal() {
        for code in NON_RETRYABLE_STATUS_CODES {
            let err = ControlPlaneError::with_code(code, "rejected");
            assert!(err.is_terminal(), "status {code} should be terminal");
        }
    }

    /// Story: server errors and network failures are retryable
    #[test]
    fn story_server_errors_are_retryable() {
        assert!(!ControlPlaneError::with_code(500, "boom").is_terminal());
        assert!(!ControlPlaneError::with_code(503, "unavailable").is_terminal());
        assert!(!ControlPlaneError::transient("connection reset").is_terminal());
    }

    /// Story: a 404 on delete means the resource is already gone
    ///
    /// The compensation runner deletes every kind that could have been
    /// created; kinds that never were come back 404 and count as success.
    #[test]
    fn story_not_found_is_distinguishable() {
        assert!(ControlPlaneError::with_code(404, "no such workload").is_not_found());
        assert!(!ControlPlaneError::with_code(409, "conflict").is_not_found());
        assert!(!ControlPlaneError::transient("connection reset").is_not_found());
    }

    /// Story: errors render with enough context to act on
    #[test]
    fn story_error_messages_carry_context() {
        let err = Error::duplicate_name("churn-model", "tenant-acme");
        assert!(err.to_string().contains("churn-model"));
        assert!(err.to_string().contains("tenant-acme"));

        let err = Error::timeout("churn-model", Duration::from_secs(300));
        assert!(err.to_string().contains("300"));

        let err = Error::validation("maxReplicas must be >= minReplicas");
        assert!(err.to_string().contains("validation error"));

        let err: Error = ControlPlaneError::with_code(503, "apiserver overloaded").into();
        assert!(err.to_string().contains("503"));
    }
}
