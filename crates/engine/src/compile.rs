//! Parameter compilation.
//!
//! Turns one component definition (plus the environment it belongs to) into
//! the flat [`ParameterSet`] submitted to the remote workflow. Compilation is
//! pure: identical inputs always produce an identical, identically ordered set.
//!
//! Missing optional fields never fail compilation. Scalars the workflow
//! always expects are emitted as `null`, `location` and `attributesJS` are
//! omitted, and the run list is built from whichever parts are present.

use corral_types::{Component, ParameterSet};
use serde_json::Value;

use crate::error::ProvisionError;

/// Environment-wide inputs shared by every component compiled in a run.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// Product identifier, sent as the business unit.
    pub product: &'a str,
    pub environment: &'a str,
    /// Whether the run submits one request per named node.
    pub named_nodes: bool,
}

/// Compile the parameter set for `component`.
///
/// With a `node_name`, the set targets exactly that node (`machineCount = 1`);
/// without one, it requests `component.count` machines. Calling without a node
/// name while the run is in named-node mode is a contract violation and fails
/// with [`ProvisionError::InvalidState`].
pub fn compile_parameters(
    name: &str,
    component: &Component,
    context: &CompileContext<'_>,
    node_name: Option<&str>,
) -> Result<ParameterSet, ProvisionError> {
    if context.named_nodes && node_name.is_none() {
        return Err(ProvisionError::invalid_state(format!(
            "attempting to build named nodes for component '{name}', but no node name was supplied"
        )));
    }

    let compute = component.compute.clone().unwrap_or_default();

    let mut parameters = ParameterSet::new();
    parameters.insert("component", name);
    parameters.insert("businessUnit", context.product);
    parameters.insert("environment", context.environment);
    parameters.insert("onBehalfOf", optional(component.execute_on_behalf_of.clone()));
    parameters.insert("reservation", optional(component.reservation_policy.clone()));
    parameters.insert("coreCount", optional(compute.cpu));
    parameters.insert("ramMB", optional(compute.ram));
    parameters.insert("image", optional(compute.image));
    if let Some(location) = &component.location {
        parameters.insert("location", location.as_str());
    }
    parameters.insert("runlist", run_list(component));

    if let Some(tags) = component.attributes.as_ref().and_then(|attributes| attributes.tags.as_ref()) {
        parameters.insert("attributesJS", tags.to_string());
    }

    match node_name {
        Some(node_name) => {
            parameters.insert("machineCount", 1);
            parameters.insert("nodename", node_name);
        }
        None => parameters.insert("machineCount", component.count),
    }

    Ok(parameters)
}

/// Base run list followed by the component role; absent parts are skipped.
fn run_list(component: &Component) -> Value {
    let entries = component
        .run_list
        .iter()
        .flatten()
        .chain(component.component_role.as_ref())
        .map(|entry| Value::String(entry.clone()))
        .collect();
    Value::Array(entries)
}

fn optional<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}
