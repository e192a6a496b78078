//! # Corral Engine
//!
//! The orchestration core behind `corral provision`. It turns a declarative
//! [`Environment`] into parameterized executions of remote workflows and,
//! optionally, waits for those executions to finish.
//!
//! ## Usage
//!
//! ```rust
//! use corral_engine::load_environment_from_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let path = temp_dir.path().join("qa.yaml");
//! std::fs::write(&path, r#"
//! product: shop
//! environment: qa
//! components:
//!   web:
//!     workflow_name: Provision Linux
//!     nodes: [web01, web02]
//!     count: 2
//! "#)?;
//!
//! let environment = load_environment_from_file(&path)?;
//! assert_eq!(environment.components["web"].count, 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`compile`**: component definition to [`ParameterSet`](corral_types::ParameterSet)
//! - **`resolve`**: workflow handle resolution with reuse across components
//! - **`executor`**: up-front planning and single submissions
//! - **`registry`**: outstanding executions by workflow id
//! - **`poller`**: bounded, cancellable wait for executions to finish
//! - **`service`**: the remote engine boundary and its HTTP implementation
//! - **`report`**: progress events and sinks
//! - **`orchestrator`**: the [`orchestrate`] entry point tying it together

use std::{fs, path::Path};

use anyhow::{Context, Result};
use corral_types::Environment;

pub mod compile;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod service;

pub use compile::{CompileContext, compile_parameters};
pub use error::ProvisionError;
pub use executor::{Plan, SubmitOptions, prepare_plan, submit};
pub use orchestrator::{OrchestrateOptions, ProvisionOutcome, orchestrate};
pub use poller::{DEFAULT_WATCH_INTERVAL, ExecutionPoller, FinishedExecution, PollerState, WatchOptions, WatchReport};
pub use registry::JobRegistry;
pub use report::{ConsoleSink, EventSink, MemorySink, ProvisionEvent, TracingSink};
pub use resolve::{ConnectionDefaults, WorkflowHandle, WorkflowResolver};
pub use service::{ExecutionService, HttpConnector, ResolvedWorkflow, ServiceConnector, WorkflowLookup};

/// Loads an environment document from YAML or JSON.
///
/// JSON is a subset of YAML, so a single parser covers both formats.
pub fn load_environment_from_file(file_path: impl AsRef<Path>) -> Result<Environment> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read environment file: {}", file_path.display()))?;
    let environment: Environment =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse environment file: {}", file_path.display()))?;
    if environment.components.is_empty() {
        anyhow::bail!("Environment file {} declares no components", file_path.display());
    }
    Ok(environment)
}
