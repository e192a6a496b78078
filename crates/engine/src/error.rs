//! Error taxonomy for a provisioning run.
//!
//! Input validation errors are raised before any remote call for the
//! offending component. Remote errors are never retried. Nothing here is
//! recoverable: every variant aborts the run and surfaces to the caller.

use thiserror::Error;

/// Main error type for orchestration.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("component '{component}' requests named nodes but declares {nodes} node(s) for a count of {count}")]
    NodeCountMismatch { component: String, nodes: usize, count: u32 },

    #[error("invalid state: {message}")]
    InvalidState { message: String },

    #[error("workflow not found: {workflow}")]
    NotFound { workflow: String },

    #[error("remote error during {operation}: {message}")]
    Remote { operation: String, message: String },

    #[error("watch cancelled with {outstanding} execution(s) still outstanding")]
    Cancelled { outstanding: usize },

    #[error("watch stopped after reaching its {limit} limit with {outstanding} execution(s) still outstanding")]
    WatchLimitReached { limit: String, outstanding: usize },
}

impl ProvisionError {
    /// Create a node count mismatch error.
    pub fn node_count_mismatch(component: impl Into<String>, nodes: usize, count: u32) -> Self {
        Self::NodeCountMismatch {
            component: component.into(),
            nodes,
            count,
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a workflow not found error.
    pub fn not_found(workflow: impl Into<String>) -> Self {
        Self::NotFound {
            workflow: workflow.into(),
        }
    }

    /// Create a remote error.
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while screening the environment, before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::NodeCountMismatch { .. } | Self::InvalidState { .. })
    }
}
