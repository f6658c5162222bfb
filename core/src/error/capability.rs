use std::time::Duration;

use thiserror::Error;

/// Failure of an external capability call (reasoning, retrieval, sandbox, provisioning).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("transient capability error: {0}")]
    Transient(String),

    #[error("capability call timed out after {0:?}")]
    Timeout(Duration),

    #[error("capability rejected the request: {0}")]
    Rejected(String),

    #[error("invalid capability response: {0}")]
    InvalidResponse(String),
}

impl CapabilityError {
    /// Transient errors are retried with backoff; everything else propagates.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// A node's external call failed after the retry budget was spent.
#[derive(Error, Debug, Clone)]
#[error("node '{role}' failed: {cause}")]
pub struct NodeExecutionError {
    pub role: String,
    pub cause: CapabilityError,
}

impl NodeExecutionError {
    pub fn new(role: impl Into<String>, cause: CapabilityError) -> Self {
        Self {
            role: role.into(),
            cause,
        }
    }
}
