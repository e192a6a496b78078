//! Single-submission execution.

use std::time::Instant;

use corral_types::ParameterSet;
use corral_util::redact_sensitive;
use tracing::{debug, info, warn};

use crate::{
    error::ProvisionError,
    report::{EventSink, ProvisionEvent},
    resolve::WorkflowHandle,
};

/// Per-run switches that change how submissions behave.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    pub dry_run: bool,
    pub verbose: bool,
}

/// Submit `parameters` to the workflow behind `handle`.
///
/// Returns the new execution id, or `None` in dry-run mode, where no remote
/// call is made. Remote failures propagate unchanged.
pub async fn submit(
    handle: &WorkflowHandle,
    parameters: &ParameterSet,
    options: SubmitOptions,
    sink: &dyn EventSink,
) -> Result<Option<String>, ProvisionError> {
    if options.dry_run {
        if options.verbose {
            sink.emit(&ProvisionEvent::DryRunPreview {
                workflow: handle.name.clone(),
                workflow_id: handle.id.clone(),
                parameters: preview(parameters),
            });
        }
        sink.emit(&ProvisionEvent::NotExecuting {
            workflow: handle.name.clone(),
        });
        debug!(workflow_id = %handle.id, "dry run; submission skipped");
        return Ok(None);
    }

    let started = Instant::now();
    let execution_id = match handle.service.submit_execution(&handle.id, parameters).await {
        Ok(execution_id) => execution_id,
        Err(error) => {
            warn!(workflow_id = %handle.id, error = %error, "submission failed");
            return Err(error);
        }
    };
    info!(
        workflow_id = %handle.id,
        execution_id = %execution_id,
        duration_ms = started.elapsed().as_millis() as u64,
        "execution submitted"
    );
    sink.emit(&ProvisionEvent::ExecutionSubmitted {
        workflow_id: handle.id.clone(),
        execution_id: execution_id.clone(),
    });
    Ok(Some(execution_id))
}

fn preview(parameters: &ParameterSet) -> String {
    let rendered = serde_json::to_string_pretty(parameters).unwrap_or_else(|_| format!("{parameters:?}"));
    redact_sensitive(&rendered)
}
