//! Bookkeeping of outstanding executions, grouped by workflow id.
//!
//! Entries are created lazily by the first [`JobRegistry::record`] for a
//! workflow id and disappear as soon as their last execution is retired, so an
//! empty registry means nothing is left to watch. Submission only appends and
//! polling only retires; the two phases never overlap.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Workflow id to outstanding execution ids, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobRegistry {
    jobs: IndexMap<String, IndexSet<String>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `execution_id` under `workflow_id`, creating the entry if needed.
    pub fn record(&mut self, workflow_id: &str, execution_id: &str) {
        self.jobs
            .entry(workflow_id.to_string())
            .or_default()
            .insert(execution_id.to_string());
    }

    /// Stop tracking `execution_id`. Removes the workflow entry once it is empty.
    ///
    /// Returns whether the execution was being tracked.
    pub fn retire(&mut self, workflow_id: &str, execution_id: &str) -> bool {
        let Some(executions) = self.jobs.get_mut(workflow_id) else {
            return false;
        };
        let removed = executions.shift_remove(execution_id);
        if executions.is_empty() {
            self.jobs.shift_remove(workflow_id);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of outstanding executions across all workflows.
    pub fn outstanding(&self) -> usize {
        self.jobs.values().map(IndexSet::len).sum()
    }

    pub fn contains(&self, workflow_id: &str, execution_id: &str) -> bool {
        self.jobs
            .get(workflow_id)
            .is_some_and(|executions| executions.contains(execution_id))
    }

    pub fn workflow_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn executions(&self, workflow_id: &str) -> impl Iterator<Item = &str> {
        self.jobs.get(workflow_id).into_iter().flatten().map(String::as_str)
    }

    /// Owned copy of the registry contents, for reporting.
    pub fn snapshot(&self) -> Vec<(String, Vec<String>)> {
        self.jobs
            .iter()
            .map(|(workflow_id, executions)| (workflow_id.clone(), executions.iter().cloned().collect()))
            .collect()
    }
}
