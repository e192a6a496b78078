//! Shared data model for the Corral provisioning tools.
//!
//! The types in this crate describe the declarative input (an [`Environment`]
//! made of named [`Component`]s), the compiled [`ParameterSet`] handed to the
//! remote workflow engine, and the connection settings used to reach it.
//! Execution lifecycle types live in [`workflow`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod workflow;

pub use workflow::{ExecutionState, ExecutionStatus};

/// A single provisioning run's input: one product environment and its components.
///
/// Component order is preserved from the source document so submissions are
/// issued in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Environment {
    /// Product identifier, reported to the engine as the business unit.
    pub product: String,
    /// Environment identifier (for example `dev`, `qa`, `prod`).
    pub environment: String,
    /// Ordered mapping of component name to component definition.
    #[serde(default)]
    pub components: IndexMap<String, Component>,
}

/// A named provisioning unit: a set of machines sharing a role.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Component {
    /// Name of the remote workflow that builds this component.
    pub workflow_name: String,
    /// Explicit workflow identifier; always preferred over a name lookup.
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Base URL of the workflow engine's API.
    #[serde(default, rename = "vco_url")]
    pub url: Option<String>,
    /// Component-level TLS verification override.
    #[serde(default)]
    pub verify_ssl: Option<bool>,
    #[serde(default)]
    pub compute: Option<ComputeProfile>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reservation_policy: Option<String>,
    /// Identity the engine should act on behalf of.
    #[serde(default)]
    pub execute_on_behalf_of: Option<String>,
    #[serde(default)]
    pub run_list: Option<Vec<String>>,
    /// Role appended to the run list.
    #[serde(default)]
    pub component_role: Option<String>,
    /// Explicit node names for named-node mode.
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
    /// Requested instance count.
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub attributes: Option<ComponentAttributes>,
}

impl Component {
    /// Node names declared for this component, empty when none were given.
    pub fn node_names(&self) -> &[String] {
        self.nodes.as_deref().unwrap_or_default()
    }
}

/// Compute sizing for a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ComputeProfile {
    #[serde(default)]
    pub cpu: Option<u32>,
    /// Memory in megabytes.
    #[serde(default)]
    pub ram: Option<u64>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Free-form component attributes.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ComponentAttributes {
    /// Tags forwarded to the engine as a JSON document.
    #[serde(default)]
    pub tags: Option<Value>,
}

/// Username/password pair used to authenticate against the workflow engine.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything needed to open a session with the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// API base URL; `None` when neither the component nor the caller supplied one.
    pub url: Option<String>,
    pub credentials: Credentials,
    pub verify_ssl: bool,
}

/// Flat, ordered set of input parameters compiled for one workflow submission.
///
/// Insertion order is preserved so identical inputs always serialize to
/// identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: IndexMap<String, Value>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
