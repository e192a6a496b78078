//! Progress reporting for a provisioning run.
//!
//! The orchestrator never prints. It emits [`ProvisionEvent`]s to an
//! [`EventSink`] supplied by the caller; each event renders to the human
//! readable line shown on the console through its `Display` implementation.

use std::{fmt, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use corral_types::ExecutionState;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Lifecycle events emitted while provisioning.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionEvent {
    BuildStarted {
        product: String,
        environment: String,
        components: usize,
    },
    SubmissionRequested {
        workflow: String,
        component: String,
        node: Option<String>,
    },
    ExecutionSubmitted {
        workflow_id: String,
        execution_id: String,
    },
    /// A submission was skipped because the run is a dry run.
    NotExecuting {
        workflow: String,
    },
    /// Verbose dry-run preview of the handle and compiled parameters.
    DryRunPreview {
        workflow: String,
        workflow_id: String,
        parameters: String,
    },
    SubmissionSummary {
        jobs: Vec<(String, Vec<String>)>,
    },
    WatchStarted {
        jobs: Vec<(String, Vec<String>)>,
        interval: Duration,
    },
    WatchTick {
        tick: u32,
        at: DateTime<Utc>,
    },
    ExecutionRunning {
        workflow_id: String,
        execution_id: String,
        state: ExecutionState,
    },
    ExecutionFinished {
        workflow_id: String,
        execution_id: String,
        state: ExecutionState,
        run_time: Option<chrono::Duration>,
        outputs: IndexMap<String, Value>,
    },
    WatchCompleted {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
}

impl fmt::Display for ProvisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildStarted {
                product,
                environment,
                components,
            } => write!(f, "Executing build of {product}/{environment} ({components} component(s))"),
            Self::SubmissionRequested { workflow, component, node } => match node {
                Some(node) => write!(f, "Requesting '{workflow}' execution for component {component}, node {node}"),
                None => write!(f, "Requesting '{workflow}' execution for component {component}"),
            },
            Self::ExecutionSubmitted { execution_id, .. } => write!(f, "  submitted ({execution_id})"),
            Self::NotExecuting { workflow } => write!(f, "  not executing '{workflow}' due to --dry-run"),
            Self::DryRunPreview {
                workflow,
                workflow_id,
                parameters,
            } => write!(f, "Workflow data (--verbose):\nWorkflow: {workflow} (id {workflow_id})\n{parameters}"),
            Self::SubmissionSummary { jobs } => {
                write!(f, "The following executions have been submitted:")?;
                write_jobs(f, jobs)
            }
            Self::WatchStarted { jobs, interval } => {
                write!(f, "Waiting for the following executions to complete:")?;
                write_jobs(f, jobs)?;
                write!(f, "\nWill wait {} seconds between checks.", interval.as_secs_f64())
            }
            Self::WatchTick { at, .. } => write!(f, "Checking on running workflows ({})...", at.to_rfc3339()),
            Self::ExecutionRunning {
                workflow_id,
                execution_id,
                state,
            } => write!(f, "- {workflow_id}\n  - {execution_id} {state}"),
            Self::ExecutionFinished {
                workflow_id,
                execution_id,
                state,
                run_time,
                outputs,
            } => {
                write!(f, "- {workflow_id}\n  - {execution_id} {state}")?;
                if let Some(run_time) = run_time {
                    write!(f, "; Run time {} seconds", run_time.num_milliseconds() as f64 / 1000.0)?;
                }
                for (key, value) in outputs {
                    write!(f, "\n   {key}: {}", render_value(value))?;
                }
                Ok(())
            }
            Self::WatchCompleted {
                started_at,
                finished_at,
            } => {
                let total = (*finished_at - *started_at).num_milliseconds() as f64 / 1000.0;
                write!(
                    f,
                    "All workflows completed.\nStarted:  {}\nFinished: {}\nTotal {total:.2} seconds",
                    started_at.to_rfc3339(),
                    finished_at.to_rfc3339()
                )
            }
        }
    }
}

fn write_jobs(f: &mut fmt::Formatter<'_>, jobs: &[(String, Vec<String>)]) -> fmt::Result {
    for (workflow_id, executions) in jobs {
        write!(f, "\n- Workflow {workflow_id}")?;
        for execution_id in executions {
            write!(f, "\n  - {execution_id}")?;
        }
    }
    Ok(())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Destination for [`ProvisionEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProvisionEvent);
}

/// Prints each event on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &ProvisionEvent) {
        println!("{event}");
    }
}

/// Mirrors events into `tracing` at `debug` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ProvisionEvent) {
        debug!(target: "corral::report", "{event}");
    }
}

/// Sends every event to both sinks, first to second.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&self, event: &ProvisionEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// Keeps every event in memory; used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProvisionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events emitted so far.
    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ProvisionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards events to a Tokio channel; a closed receiver drops them.
impl EventSink for UnboundedSender<ProvisionEvent> {
    fn emit(&self, event: &ProvisionEvent) {
        let _ = self.send(event.clone());
    }
}
