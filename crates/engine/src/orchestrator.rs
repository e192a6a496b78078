//! The `orchestrate` entry point.
//!
//! A run has three phases, strictly in sequence:
//! 1. plan: validate and compile every component, no remote calls
//! 2. submit: resolve handles and submit each planned parameter set in
//!    declaration order, recording execution ids in the [`JobRegistry`]
//! 3. watch (optional): drain the registry with an [`ExecutionPoller`]

use chrono::{DateTime, Utc};
use corral_types::{Credentials, Environment};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    error::ProvisionError,
    executor::{SubmitOptions, prepare_plan, submit},
    poller::{ExecutionPoller, WatchOptions, WatchReport},
    registry::JobRegistry,
    report::{EventSink, ProvisionEvent},
    resolve::{ConnectionDefaults, WorkflowHandle, WorkflowResolver},
    service::ServiceConnector,
};

/// Caller-supplied switches for one run.
#[derive(Debug, Clone)]
pub struct OrchestrateOptions {
    /// Submit once per declared node. When off, each component is one batch submission.
    pub named_nodes: bool,
    pub credentials: Credentials,
    /// Run-level TLS verification; overrides every component's setting.
    pub verify_ssl: Option<bool>,
    /// Service URL for components that do not carry one.
    pub default_url: Option<String>,
    pub watch: bool,
    pub watch_options: WatchOptions,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for OrchestrateOptions {
    fn default() -> Self {
        Self {
            named_nodes: true,
            credentials: Credentials::default(),
            verify_ssl: None,
            default_url: None,
            watch: false,
            watch_options: WatchOptions::default(),
            verbose: false,
            dry_run: false,
        }
    }
}

/// What a run left behind.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOutcome {
    /// Executions still outstanding. Empty after a dry run or a completed watch.
    pub registry: JobRegistry,
    /// Every `(workflow id, execution id)` submitted, in submission order.
    pub submitted: Vec<(String, String)>,
    pub watch: Option<WatchReport>,
}

/// Provision every component of `environment`.
///
/// Errors abort the run immediately. Executions submitted before a failure
/// keep running remotely and are not tracked further.
pub async fn orchestrate(
    environment: &Environment,
    options: &OrchestrateOptions,
    connector: &dyn ServiceConnector,
    sink: &dyn EventSink,
    cancel: CancellationToken,
) -> Result<ProvisionOutcome, ProvisionError> {
    let started_at: DateTime<Utc> = Utc::now();
    sink.emit(&ProvisionEvent::BuildStarted {
        product: environment.product.clone(),
        environment: environment.environment.clone(),
        components: environment.components.len(),
    });

    let plan = prepare_plan(environment, options.named_nodes)?;
    info!(
        product = %environment.product,
        environment = %environment.environment,
        components = plan.components.len(),
        submissions = plan.submission_count(),
        dry_run = options.dry_run,
        "provisioning plan ready"
    );

    let resolver = WorkflowResolver::new(
        connector,
        ConnectionDefaults {
            credentials: options.credentials.clone(),
            url: options.default_url.clone(),
            verify_ssl: options.verify_ssl,
        },
    );
    let submit_options = SubmitOptions {
        dry_run: options.dry_run,
        verbose: options.verbose,
    };

    let mut outcome = ProvisionOutcome::default();
    let mut handle: Option<WorkflowHandle> = None;

    for component_plan in &plan.components {
        let current = resolver.resolve(handle.as_ref(), component_plan.component).await?;
        for submission in &component_plan.submissions {
            sink.emit(&ProvisionEvent::SubmissionRequested {
                workflow: current.name.clone(),
                component: component_plan.name.to_string(),
                node: submission.node.clone(),
            });
            if let Some(execution_id) = submit(&current, &submission.parameters, submit_options, sink).await? {
                outcome.registry.record(&current.id, &execution_id);
                outcome.submitted.push((current.id.clone(), execution_id));
            }
        }
        handle = Some(current);
    }

    if options.dry_run {
        return Ok(outcome);
    }

    sink.emit(&ProvisionEvent::SubmissionSummary {
        jobs: outcome.registry.snapshot(),
    });

    if !options.watch {
        return Ok(outcome);
    }
    let Some(handle) = handle else {
        return Ok(outcome);
    };

    let poller = ExecutionPoller::new(handle.service, std::mem::take(&mut outcome.registry), options.watch_options, sink);
    outcome.watch = Some(poller.run(started_at, &cancel).await?);
    Ok(outcome)
}
