//! JSON shapes exchanged with the orchestrator REST API.
//!
//! The engine wraps every parameter value in a type-tagged envelope:
//!
//! ```text
//! { "name": "coreCount", "type": "number", "scope": "local",
//!   "value": { "number": { "value": 2 } } }
//! ```
//!
//! Arrays nest the same envelope under `array.elements`. This module converts
//! between that representation and plain `serde_json::Value`s.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use corral_types::{ExecutionState, ExecutionStatus, ParameterSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Workflow identity as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
}

/// Body of a `POST workflows/{id}/executions` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionRequest {
    pub parameters: Vec<WireParameter>,
}

/// One type-tagged parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub value: Option<Value>,
}

fn default_scope() -> String {
    "local".to_string()
}

/// Execution document returned by `GET workflows/{id}/executions/{execution_id}`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExecutionDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "start-date")]
    pub start_date: Option<Value>,
    #[serde(default, rename = "end-date")]
    pub end_date: Option<Value>,
    #[serde(default, rename = "output-parameters")]
    pub output_parameters: Vec<WireParameter>,
}

impl ExecutionDocument {
    /// Lifecycle snapshot for this execution. A missing state is reported as `unknown`.
    pub fn status(&self) -> ExecutionStatus {
        let state = self
            .state
            .as_deref()
            .map(|raw| raw.parse().unwrap_or(ExecutionState::Other(raw.to_string())))
            .unwrap_or_else(|| ExecutionState::Other("unknown".into()));
        ExecutionStatus {
            state,
            started_at: self.start_date.as_ref().and_then(parse_timestamp),
            ended_at: self.end_date.as_ref().and_then(parse_timestamp),
        }
    }

    /// Output parameters decoded to plain JSON values, in the engine's order.
    pub fn outputs(&self) -> IndexMap<String, Value> {
        self.output_parameters
            .iter()
            .map(|parameter| {
                let value = parameter.value.as_ref().map(decode_value).unwrap_or(Value::Null);
                (parameter.name.clone(), value)
            })
            .collect()
    }
}

/// Listing returned by `GET workflows?conditions=name=...`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventoryListing {
    #[serde(default)]
    pub link: Vec<InventoryLink>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventoryLink {
    #[serde(default)]
    pub attributes: Vec<InventoryAttribute>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventoryAttribute {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl InventoryListing {
    /// Workflows in the listing that carry both an id and a name.
    pub fn workflows(&self) -> Vec<WorkflowSummary> {
        self.link
            .iter()
            .filter_map(|link| {
                let attribute = |key: &str| {
                    link.attributes
                        .iter()
                        .find(|attribute| attribute.name == key)
                        .and_then(|attribute| attribute.value.clone())
                };
                Some(WorkflowSummary {
                    id: attribute("id")?,
                    name: attribute("name")?,
                })
            })
            .collect()
    }
}

/// Builds the request body for a set of compiled parameters.
///
/// Null values are not sent; the engine treats an absent input as unset.
pub fn encode_parameters(parameters: &ParameterSet) -> ExecutionRequest {
    let parameters = parameters
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| WireParameter {
            name: name.clone(),
            r#type: wire_type(value),
            scope: default_scope(),
            value: Some(encode_value(value)),
        })
        .collect();
    ExecutionRequest { parameters }
}

fn wire_type(value: &Value) -> String {
    match value {
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::Array(items) => {
            let element_type = items.iter().find(|item| !item.is_null()).map(wire_type).unwrap_or_else(|| "string".into());
            format!("Array/{element_type}")
        }
        Value::String(_) | Value::Object(_) | Value::Null => "string".into(),
    }
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Bool(flag) => json!({ "boolean": { "value": flag } }),
        Value::Number(number) => json!({ "number": { "value": number } }),
        Value::String(text) => json!({ "string": { "value": text } }),
        Value::Array(items) => {
            let elements: Vec<Value> = items.iter().filter(|item| !item.is_null()).map(encode_value).collect();
            json!({ "array": { "elements": elements } })
        }
        Value::Object(_) => json!({ "string": { "value": value.to_string() } }),
        Value::Null => Value::Null,
    }
}

/// Unwraps a type-tagged value envelope into plain JSON.
///
/// Scalar envelopes yield their inner `value`; arrays are decoded element by
/// element; anything else (for example SDK object references) is returned as
/// the inner object.
pub fn decode_value(envelope: &Value) -> Value {
    let Some(map) = envelope.as_object() else {
        return envelope.clone();
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "string" | "number" | "boolean" | "secure-string" | "date" => inner.get("value").cloned().unwrap_or(Value::Null),
        "array" => {
            let elements = inner
                .get("elements")
                .and_then(Value::as_array)
                .map(|elements| elements.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(elements)
        }
        _ => inner.clone(),
    }
}

/// Parses an engine timestamp: RFC 3339, ISO 8601 with a `+hhmm` offset, or epoch milliseconds.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(number) => number.as_i64().and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::String(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z"))
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    }
}

/// Extracts the execution id from a `Location` header such as
/// `https://host/vco/api/workflows/<wf>/executions/<id>/`.
pub fn execution_id_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "executions")
        .map(str::to_string)
}
