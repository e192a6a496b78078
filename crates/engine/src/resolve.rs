//! Workflow handle resolution with reuse across consecutive components.
//!
//! The first component of a run opens the session: connection parameters are
//! assembled from the component URL, the caller's credentials and the TLS
//! policy, and the workflow is resolved by explicit id or by name. Later
//! components reuse that session. When a component targets the same workflow
//! name as the previous handle and names no explicit id, the previous handle's
//! id is carried forward without any remote call.

use std::{fmt, sync::Arc};

use corral_types::{Component, ConnectionParams, Credentials};
use tracing::{debug, info};

use crate::{
    error::ProvisionError,
    service::{ExecutionService, ServiceConnector, WorkflowLookup},
};

/// Resolved reference to a remote workflow plus the session used to reach it.
#[derive(Clone)]
pub struct WorkflowHandle {
    pub name: String,
    pub id: String,
    pub service: Arc<dyn ExecutionService>,
}

impl fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for WorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workflow: {} (id {})", self.name, self.id)
    }
}

/// Run-wide settings that apply when the session is first opened.
#[derive(Debug, Clone, Default)]
pub struct ConnectionDefaults {
    pub credentials: Credentials,
    /// URL used when the first component does not name one.
    pub url: Option<String>,
    /// Run-level TLS setting; takes precedence over the component's.
    pub verify_ssl: Option<bool>,
}

/// TLS verification precedence: run-level setting, then component, then `true`.
pub fn effective_verify_ssl(run_level: Option<bool>, component: &Component) -> bool {
    run_level.or(component.verify_ssl).unwrap_or(true)
}

/// Resolves [`WorkflowHandle`]s for a sequence of components.
pub struct WorkflowResolver<'a> {
    connector: &'a dyn ServiceConnector,
    defaults: ConnectionDefaults,
}

impl<'a> WorkflowResolver<'a> {
    pub fn new(connector: &'a dyn ServiceConnector, defaults: ConnectionDefaults) -> Self {
        Self { connector, defaults }
    }

    /// Resolve the handle for `component`, reusing `previous` where possible.
    ///
    /// An explicit `workflow_id` on the component always wins over the cache.
    pub async fn resolve(
        &self,
        previous: Option<&WorkflowHandle>,
        component: &Component,
    ) -> Result<WorkflowHandle, ProvisionError> {
        let lookup = lookup_for(component);

        let Some(previous) = previous else {
            let params = self.connection_params(component);
            info!(
                workflow = %component.workflow_name,
                url = params.url.as_deref().unwrap_or("<unset>"),
                verify_ssl = params.verify_ssl,
                "opening workflow service session"
            );
            let service = self.connector.connect(&params)?;
            return resolve_with(service, &lookup).await;
        };

        if matches!(lookup, WorkflowLookup::Name(_)) && previous.name == component.workflow_name {
            debug!(workflow = %previous.name, workflow_id = %previous.id, "reusing cached workflow handle");
            return Ok(previous.clone());
        }

        resolve_with(Arc::clone(&previous.service), &lookup).await
    }

    /// Connection parameters for the session opened on behalf of `component`.
    pub fn connection_params(&self, component: &Component) -> ConnectionParams {
        ConnectionParams {
            url: component.url.clone().or_else(|| self.defaults.url.clone()),
            credentials: self.defaults.credentials.clone(),
            verify_ssl: effective_verify_ssl(self.defaults.verify_ssl, component),
        }
    }
}

fn lookup_for(component: &Component) -> WorkflowLookup {
    match &component.workflow_id {
        Some(id) => WorkflowLookup::Id {
            id: id.clone(),
            name: component.workflow_name.clone(),
        },
        None => WorkflowLookup::Name(component.workflow_name.clone()),
    }
}

async fn resolve_with(service: Arc<dyn ExecutionService>, lookup: &WorkflowLookup) -> Result<WorkflowHandle, ProvisionError> {
    let resolved = service.resolve_workflow(lookup).await?;
    debug!(workflow = %resolved.name, workflow_id = %resolved.id, "resolved workflow");
    Ok(WorkflowHandle {
        name: resolved.name,
        id: resolved.id,
        service,
    })
}
