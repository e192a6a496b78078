//! Scripted in-memory workflow engine used by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use corral_engine::{ExecutionService, ProvisionError, ResolvedWorkflow, ServiceConnector, WorkflowLookup};
use corral_types::{Component, ConnectionParams, Environment, ExecutionState, ExecutionStatus, ParameterSet};
use indexmap::IndexMap;
use serde_json::{Value, json};

/// Everything the scripted engine was asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    pub connections: Vec<ConnectionParams>,
    pub lookups: Vec<WorkflowLookup>,
    pub submissions: Vec<(String, ParameterSet)>,
    pub status_queries: Vec<(String, String)>,
    pub output_fetches: Vec<(String, String)>,
}

/// Workflow engine double.
///
/// Workflows resolve to `wf-<name>`; executions are numbered `exec-1`,
/// `exec-2`, ... and report `running` for `polls_before_done` status queries
/// before completing with a fixed 30 second run time.
#[derive(Debug, Default)]
pub struct ScriptedService {
    pub log: Mutex<CallLog>,
    pub polls_before_done: u32,
    pub fail_submissions: bool,
    pub fail_status_queries: bool,
    pending: Mutex<IndexMap<String, u32>>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_polls_before_done(polls_before_done: u32) -> Arc<Self> {
        Arc::new(Self {
            polls_before_done,
            ..Default::default()
        })
    }

    pub fn failing_submissions() -> Arc<Self> {
        Arc::new(Self {
            fail_submissions: true,
            ..Default::default()
        })
    }

    pub fn failing_status_queries() -> Arc<Self> {
        Arc::new(Self {
            fail_status_queries: true,
            ..Default::default()
        })
    }

    pub fn submissions(&self) -> Vec<(String, ParameterSet)> {
        self.log.lock().unwrap().submissions.clone()
    }

    pub fn lookups(&self) -> Vec<WorkflowLookup> {
        self.log.lock().unwrap().lookups.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.log.lock().unwrap().connections.len()
    }

    pub fn status_query_count(&self) -> usize {
        self.log.lock().unwrap().status_queries.len()
    }
}

#[async_trait]
impl ExecutionService for ScriptedService {
    async fn resolve_workflow(&self, lookup: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError> {
        self.log.lock().unwrap().lookups.push(lookup.clone());
        match lookup {
            WorkflowLookup::Id { id, name } => Ok(ResolvedWorkflow {
                id: id.clone(),
                name: name.clone(),
            }),
            WorkflowLookup::Name(name) if name == "Missing" => Err(ProvisionError::not_found(lookup.label())),
            WorkflowLookup::Name(name) => Ok(ResolvedWorkflow {
                id: format!("wf-{name}"),
                name: name.clone(),
            }),
        }
    }

    async fn submit_execution(&self, workflow_id: &str, parameters: &ParameterSet) -> Result<String, ProvisionError> {
        if self.fail_submissions {
            return Err(ProvisionError::remote("submit execution", "HTTP 400 Bad Request"));
        }
        let mut log = self.log.lock().unwrap();
        log.submissions.push((workflow_id.to_string(), parameters.clone()));
        let execution_id = format!("exec-{}", log.submissions.len());
        self.pending
            .lock()
            .unwrap()
            .insert(execution_id.clone(), self.polls_before_done);
        Ok(execution_id)
    }

    async fn query_status(&self, workflow_id: &str, execution_id: &str) -> Result<ExecutionStatus, ProvisionError> {
        self.log
            .lock()
            .unwrap()
            .status_queries
            .push((workflow_id.to_string(), execution_id.to_string()));
        if self.fail_status_queries {
            return Err(ProvisionError::remote("query execution status", "HTTP 503 Service Unavailable"));
        }
        let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut pending = self.pending.lock().unwrap();
        let Some(left) = pending.get_mut(execution_id) else {
            return Err(ProvisionError::remote("query execution status", format!("unknown execution {execution_id}")));
        };
        if *left > 0 {
            *left -= 1;
            return Ok(ExecutionStatus {
                state: ExecutionState::Running,
                started_at: Some(started_at),
                ended_at: None,
            });
        }
        Ok(ExecutionStatus {
            state: ExecutionState::Completed,
            started_at: Some(started_at),
            ended_at: Some(started_at + chrono::Duration::seconds(30)),
        })
    }

    async fn fetch_output_parameters(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<IndexMap<String, Value>, ProvisionError> {
        self.log
            .lock()
            .unwrap()
            .output_fetches
            .push((workflow_id.to_string(), execution_id.to_string()));
        Ok(IndexMap::from([("vmName".to_string(), json!(format!("vm-{execution_id}")))]))
    }
}

/// Connector that always hands out the same [`ScriptedService`].
pub struct ScriptedConnector {
    pub service: Arc<ScriptedService>,
}

impl ScriptedConnector {
    pub fn new(service: Arc<ScriptedService>) -> Self {
        Self { service }
    }
}

impl ServiceConnector for ScriptedConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ExecutionService>, ProvisionError> {
        self.service.log.lock().unwrap().connections.push(params.clone());
        Ok(Arc::clone(&self.service) as Arc<dyn ExecutionService>)
    }
}

pub fn component(workflow_name: &str, nodes: Option<&[&str]>, count: u32) -> Component {
    Component {
        workflow_name: workflow_name.to_string(),
        url: Some("https://vco.example.com:8281/vco/api/".to_string()),
        nodes: nodes.map(|nodes| nodes.iter().map(|node| node.to_string()).collect()),
        count,
        run_list: Some(vec!["role[base]".to_string()]),
        component_role: Some("role[web]".to_string()),
        ..Default::default()
    }
}

pub fn environment(components: Vec<(&str, Component)>) -> Environment {
    Environment {
        product: "shop".to_string(),
        environment: "qa".to_string(),
        components: components
            .into_iter()
            .map(|(name, component)| (name.to_string(), component))
            .collect(),
    }
}
