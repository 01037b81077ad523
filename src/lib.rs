//! Berth - model deployment orchestration for ML serving clusters
//!
//! Berth takes a trained model artifact and a desired-state configuration and
//! drives a remote cluster control plane into that state, tolerating partial
//! failures, transient API errors, and bounded wait times.
//!
//! # Architecture
//!
//! A deploy invocation is a saga: a sequential pipeline of phases with an
//! explicit compensating action for partial failure, used in place of a
//! transactional guarantee the control plane cannot provide. All remote
//! collaborators are injected trait handles; there is no package-level
//! client state.
//!
//! # Modules
//!
//! - [`request`] - Deployment request types and validation
//! - [`artifact`] - Model artifact metadata and registry lookup
//! - [`manifest`] - Desired-state resource types and the manifest builder
//! - [`cluster`] - Control-plane client trait and the retrying adapter
//! - [`retry`] - Retry executor with linear backoff and error classification
//! - [`readiness`] - Readiness polling for deployed workloads
//! - [`rollback`] - Best-effort compensation for failed attempts
//! - [`orchestrator`] - The deployment saga and its outcome contract
//! - [`events`] - Phase transitions, completion events, and metrics
//! - [`error`] - Error types for deployment operations

#![deny(missing_docs)]

pub mod artifact;
pub mod cluster;
pub mod error;
pub mod events;
pub mod manifest;
pub mod orchestrator;
pub mod readiness;
pub mod request;
pub mod retry;
pub mod rollback;

pub use error::Error;
pub use orchestrator::{DeploymentOutcome, Orchestrator, OrchestratorConfig};
pub use request::DeployRequest;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
