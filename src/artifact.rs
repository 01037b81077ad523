//! Model artifact metadata and registry lookup
//!
//! The registry is an external collaborator: the orchestrator only needs to
//! resolve `(model_id, tenant_id)` to artifact metadata and confirm the
//! artifact is in a deployable state before touching the cluster.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::Error;

/// ML framework the artifact was trained with
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// TensorFlow SavedModel
    Tensorflow,
    /// PyTorch TorchScript / state dict
    Pytorch,
    /// scikit-learn pickle
    Sklearn,
    /// ONNX graph
    Onnx,
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tensorflow => write!(f, "tensorflow"),
            Self::Pytorch => write!(f, "pytorch"),
            Self::Sklearn => write!(f, "sklearn"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// Lifecycle status of a model artifact
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Training in progress
    Training,
    /// Training finished
    Trained,
    /// Passed offline validation
    Validated,
    /// Training or validation failed
    Failed,
}

impl ArtifactStatus {
    /// Whether an artifact in this state may be deployed
    pub fn is_deployable(self) -> bool {
        matches!(self, Self::Trained | Self::Validated)
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Training => write!(f, "training"),
            Self::Trained => write!(f, "trained"),
            Self::Validated => write!(f, "validated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Metadata for a trained model artifact
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    /// Artifact id
    pub id: String,
    /// Artifact version
    pub version: String,
    /// Framework the model was trained with
    pub framework: Framework,
    /// Location of the serialized model in artifact storage
    pub storage_path: String,
    /// Lifecycle status
    pub status: ArtifactStatus,
    /// JSON schema of the model's input, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    /// JSON schema of the model's output, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// Trait abstracting artifact lookup for a tenant's model
///
/// Implemented by the model-registry service client in production and mocked
/// in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Look up the current artifact for `(model_id, tenant_id)`
    ///
    /// Returns `Ok(None)` when the model does not exist for the tenant.
    async fn get_artifact(
        &self,
        model_id: &str,
        tenant_id: &str,
    ) -> Result<Option<ModelArtifact>, Error>;
}
