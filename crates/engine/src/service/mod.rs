//! The boundary between the orchestration core and the remote workflow engine.
//!
//! - [`ServiceConnector`] opens a session from [`ConnectionParams`]
//! - [`ExecutionService`] is one open session: workflow lookup, execution
//!   submission, status queries and output retrieval
//! - [`http::HttpConnector`] talks to the orchestrator REST API through `corral-api`
//!
//! Tests substitute scripted implementations to observe call counts.

use std::sync::Arc;

use async_trait::async_trait;
use corral_types::{ConnectionParams, ExecutionStatus, ParameterSet};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::ProvisionError;

pub mod http;

pub use http::{HttpConnector, HttpExecutionService};

/// How a workflow should be located on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowLookup {
    /// Fetch by identifier. `name` is carried for error messages only.
    Id { id: String, name: String },
    /// Ask the engine to translate a name into an identifier.
    Name(String),
}

impl WorkflowLookup {
    /// Human-readable label for logs and errors.
    pub fn label(&self) -> String {
        match self {
            Self::Id { id, name } => format!("'{name}' (id {id})"),
            Self::Name(name) => format!("'{name}'"),
        }
    }
}

/// Identity of a workflow as confirmed by the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkflow {
    pub id: String,
    pub name: String,
}

/// One open session with the remote workflow engine.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Resolve a workflow by id or name. Fails with [`ProvisionError::NotFound`]
    /// when nothing matches.
    async fn resolve_workflow(&self, lookup: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError>;

    /// Start an execution of `workflow_id` and return its identifier.
    async fn submit_execution(&self, workflow_id: &str, parameters: &ParameterSet) -> Result<String, ProvisionError>;

    async fn query_status(&self, workflow_id: &str, execution_id: &str) -> Result<ExecutionStatus, ProvisionError>;

    /// Output parameters of a terminal execution.
    async fn fetch_output_parameters(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<IndexMap<String, Value>, ProvisionError>;
}

/// Opens sessions with the remote workflow engine.
pub trait ServiceConnector: Send + Sync {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ExecutionService>, ProvisionError>;
}
