//! Submission planning and execution.
//!
//! - [`prepare_plan`] screens every component and compiles every parameter set
//!   before anything touches the network
//! - [`submit::submit`] fires one planned submission, or previews it in dry-run mode
//!
//! Planning is all-or-nothing: a node-count mismatch in any component aborts
//! the run with zero submissions.

use corral_types::{Component, Environment, ParameterSet};
use tracing::debug;

use crate::{
    compile::{CompileContext, compile_parameters},
    error::ProvisionError,
};

pub mod submit;

pub use submit::{SubmitOptions, submit};

/// One submission to issue: the target node (named-node mode) and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSubmission {
    pub node: Option<String>,
    pub parameters: ParameterSet,
}

/// All submissions for one component, in node declaration order.
#[derive(Debug, Clone)]
pub struct ComponentPlan<'a> {
    pub name: &'a str,
    pub component: &'a Component,
    pub submissions: Vec<PlannedSubmission>,
}

/// Ordered plan for a whole environment.
#[derive(Debug, Clone, Default)]
pub struct Plan<'a> {
    pub components: Vec<ComponentPlan<'a>>,
}

impl Plan<'_> {
    /// Total number of submissions across all components.
    pub fn submission_count(&self) -> usize {
        self.components.iter().map(|plan| plan.submissions.len()).sum()
    }
}

/// Build the plan for `environment`.
///
/// In named-node mode each component fans out into one submission per node and
/// must declare exactly `count` nodes. In batch mode each component yields a
/// single submission for `count` machines and any node list is ignored.
pub fn prepare_plan(environment: &Environment, named_nodes: bool) -> Result<Plan<'_>, ProvisionError> {
    let context = CompileContext {
        product: &environment.product,
        environment: &environment.environment,
        named_nodes,
    };

    let mut components = Vec::with_capacity(environment.components.len());
    for (name, component) in &environment.components {
        let submissions = if named_nodes {
            validate_named_nodes(name, component)?;
            component
                .node_names()
                .iter()
                .map(|node| {
                    Ok(PlannedSubmission {
                        node: Some(node.clone()),
                        parameters: compile_parameters(name, component, &context, Some(node))?,
                    })
                })
                .collect::<Result<Vec<_>, ProvisionError>>()?
        } else {
            vec![PlannedSubmission {
                node: None,
                parameters: compile_parameters(name, component, &context, None)?,
            }]
        };
        debug!(component = %name, submissions = submissions.len(), named_nodes, "planned component");
        components.push(ComponentPlan {
            name,
            component,
            submissions,
        });
    }

    Ok(Plan { components })
}

/// Named-node mode requires one declared node per requested machine.
pub fn validate_named_nodes(name: &str, component: &Component) -> Result<(), ProvisionError> {
    let nodes = component.node_names().len();
    if nodes != component.count as usize {
        return Err(ProvisionError::node_count_mismatch(name, nodes, component.count));
    }
    Ok(())
}
