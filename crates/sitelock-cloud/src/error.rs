//! Provisioner error types

use crate::model::ResourceStatus;
use thiserror::Error;

/// Errors surfaced by the Resource API and the provisioning primitives
#[derive(Error, Debug)]
pub enum CloudError {
    /// The resource does not exist. Inside `reconcile` this drives the
    /// create branch and is never surfaced.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A create call lost a race against another creator
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The version token presented with an update was stale
    #[error("Conflict: version token for {0} is stale")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The key collides with a resource we do not own (other account,
    /// other region, or a shared resource that would need mutation)
    #[error("Ownership error: {0}")]
    Ownership(String),

    #[error(
        "Timed out waiting for {resource} to become {target} after {attempts} attempts \
         (last observed status: {last_status}); check the resource manually"
    )]
    Timeout {
        resource: String,
        target: ResourceStatus,
        last_status: ResourceStatus,
        attempts: u32,
    },

    #[error("{resource} entered a terminal error state: {detail}")]
    TerminalRemote { resource: String, detail: String },

    #[error("Invalid state transition for {resource}: {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("Missing pipeline output: {0}")]
    MissingOutput(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudError::Timeout { .. })
    }

    /// Errors caused by credentials or ownership. These are never retried.
    pub fn is_fatal_identity(&self) -> bool {
        matches!(
            self,
            CloudError::PermissionDenied(_) | CloudError::Ownership(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
