//! Execution lifecycle types reported by the remote workflow engine.
//!
//! An execution is alive while the engine is still working on it (or waiting
//! on an external signal) and terminal once it has completed, failed, or been
//! canceled. Unknown state strings are kept verbatim and treated as terminal so
//! a watch never spins forever on a state it cannot interpret.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// State of a single workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Running,
    Waiting,
    WaitingSignal,
    Completed,
    Failed,
    Canceled,
    /// Any state string the engine reports that is not modelled above.
    Other(String),
}

impl ExecutionState {
    /// True while the engine may still make progress on the execution.
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting | Self::WaitingSignal)
    }

    /// Inverse of [`ExecutionState::is_alive`].
    pub fn is_terminal(&self) -> bool {
        !self.is_alive()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::WaitingSignal => "waiting-signal",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl FromStr for ExecutionState {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let state = match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "waiting" => Self::Waiting,
            "waiting-signal" => Self::WaitingSignal,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Other(raw.trim().to_string()),
        };
        Ok(state)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExecutionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExecutionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Self::Other(raw)))
    }
}

/// Snapshot of an execution as returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Only present once the execution is terminal.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionStatus {
    /// Wall time the engine spent on the execution, when both timestamps are known.
    pub fn run_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started_at), Some(ended_at)) => Some(ended_at - started_at),
            _ => None,
        }
    }
}
