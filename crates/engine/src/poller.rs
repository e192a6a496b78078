//! Waiting for submitted executions to finish.
//!
//! The poller owns the [`JobRegistry`] once submission is over. Each tick
//! queries every outstanding execution, reports live ones and retires terminal
//! ones after reporting their run time and output parameters. The watch ends
//! exactly when the registry becomes empty.
//!
//! Unbounded by default. Callers may cap the number of ticks or the wall-clock
//! duration, and may cancel through a [`CancellationToken`] at any time; the
//! token is observed both while sleeping and while a tick is in flight.

use std::{future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use corral_types::ExecutionState;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::ProvisionError,
    registry::JobRegistry,
    report::{EventSink, ProvisionEvent},
    service::ExecutionService,
};

/// Default pause between two status checks.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(15);

/// Pacing and bounds for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Give up after this many ticks with executions still outstanding.
    pub max_ticks: Option<u32>,
    /// Give up once the watch has run this long.
    pub max_duration: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WATCH_INTERVAL,
            max_ticks: None,
            max_duration: None,
        }
    }
}

/// Observable progress of the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Nothing has retired yet.
    Polling,
    /// Some executions retired, others remain.
    Draining,
    /// The registry is empty.
    Done,
}

/// An execution that reached a terminal state during the watch.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedExecution {
    pub workflow_id: String,
    pub execution_id: String,
    pub state: ExecutionState,
    pub run_time: Option<chrono::Duration>,
    pub outputs: IndexMap<String, Value>,
}

/// Summary of a completed watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ticks: u32,
    pub finished: Vec<FinishedExecution>,
}

pub struct ExecutionPoller<'a> {
    service: Arc<dyn ExecutionService>,
    registry: JobRegistry,
    options: WatchOptions,
    sink: &'a dyn EventSink,
    state: PollerState,
    ticks: u32,
    finished: Vec<FinishedExecution>,
}

impl<'a> ExecutionPoller<'a> {
    pub fn new(service: Arc<dyn ExecutionService>, registry: JobRegistry, options: WatchOptions, sink: &'a dyn EventSink) -> Self {
        let state = if registry.is_empty() {
            PollerState::Done
        } else {
            PollerState::Polling
        };
        Self {
            service,
            registry,
            options,
            sink,
            state,
            ticks: 0,
            finished: Vec::new(),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Check every outstanding execution once.
    pub async fn tick(&mut self) -> Result<PollerState, ProvisionError> {
        self.ticks += 1;
        self.sink.emit(&ProvisionEvent::WatchTick {
            tick: self.ticks,
            at: Utc::now(),
        });

        for (workflow_id, executions) in self.registry.snapshot() {
            for execution_id in executions {
                self.check(&workflow_id, &execution_id).await?;
            }
        }

        self.state = if self.registry.is_empty() {
            PollerState::Done
        } else if self.finished.is_empty() {
            PollerState::Polling
        } else {
            PollerState::Draining
        };
        debug!(
            tick = self.ticks,
            outstanding = self.registry.outstanding(),
            state = ?self.state,
            "poll tick complete"
        );
        Ok(self.state)
    }

    async fn check(&mut self, workflow_id: &str, execution_id: &str) -> Result<(), ProvisionError> {
        let status = self
            .service
            .query_status(workflow_id, execution_id)
            .await
            .inspect_err(|error| warn!(workflow_id, execution_id, error = %error, "status query failed"))?;

        if status.state.is_alive() {
            self.sink.emit(&ProvisionEvent::ExecutionRunning {
                workflow_id: workflow_id.to_string(),
                execution_id: execution_id.to_string(),
                state: status.state,
            });
            return Ok(());
        }

        let outputs = self
            .service
            .fetch_output_parameters(workflow_id, execution_id)
            .await
            .inspect_err(|error| warn!(workflow_id, execution_id, error = %error, "output fetch failed"))?;
        let run_time = status.run_time();
        info!(
            workflow_id,
            execution_id,
            state = %status.state,
            run_time_ms = run_time.map(|run_time| run_time.num_milliseconds()),
            "execution finished"
        );

        let finished = FinishedExecution {
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            state: status.state,
            run_time,
            outputs,
        };
        self.sink.emit(&ProvisionEvent::ExecutionFinished {
            workflow_id: finished.workflow_id.clone(),
            execution_id: finished.execution_id.clone(),
            state: finished.state.clone(),
            run_time: finished.run_time,
            outputs: finished.outputs.clone(),
        });
        self.registry.retire(workflow_id, execution_id);
        self.finished.push(finished);
        Ok(())
    }

    /// Sleep, tick, repeat until the registry is empty.
    ///
    /// `started_at` is the start of the whole run and is only used for the
    /// final report. Stops early with [`ProvisionError::Cancelled`] when
    /// `cancel` fires, or [`ProvisionError::WatchLimitReached`] when a
    /// configured bound is hit.
    pub async fn run(mut self, started_at: DateTime<Utc>, cancel: &CancellationToken) -> Result<WatchReport, ProvisionError> {
        self.sink.emit(&ProvisionEvent::WatchStarted {
            jobs: self.registry.snapshot(),
            interval: self.options.interval,
        });
        info!(
            outstanding = self.registry.outstanding(),
            interval_ms = self.options.interval.as_millis() as u64,
            "watching executions"
        );

        let deadline = self.options.max_duration.map(|max_duration| Instant::now() + max_duration);

        while self.state != PollerState::Done {
            if let Some(max_ticks) = self.options.max_ticks
                && self.ticks >= max_ticks
            {
                return Err(self.limit_reached(format!("{max_ticks} tick")));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = until(deadline) => {
                    let limit = self.options.max_duration.unwrap_or_default();
                    return Err(self.limit_reached(format!("{} second", limit.as_secs_f64())));
                }
                _ = sleep(self.options.interval) => {}
            }

            // Dropping a tick mid-flight is safe: executions retire only after both remote calls return.
            let ticked = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.tick() => Some(result),
            };
            match ticked {
                Some(result) => {
                    result?;
                }
                None => return Err(self.cancelled()),
            }
        }

        let finished_at = Utc::now();
        self.sink.emit(&ProvisionEvent::WatchCompleted { started_at, finished_at });
        info!(ticks = self.ticks, executions = self.finished.len(), "all executions finished");

        Ok(WatchReport {
            started_at,
            finished_at,
            ticks: self.ticks,
            finished: self.finished,
        })
    }

    fn cancelled(&self) -> ProvisionError {
        let outstanding = self.registry.outstanding();
        warn!(outstanding, "watch cancelled");
        ProvisionError::Cancelled { outstanding }
    }

    fn limit_reached(&self, limit: String) -> ProvisionError {
        let outstanding = self.registry.outstanding();
        warn!(limit = %limit, outstanding, "watch limit reached");
        ProvisionError::WatchLimitReached { limit, outstanding }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use corral_types::{ExecutionStatus, ParameterSet};
    use serde_json::json;

    use super::*;
    use crate::{
        report::MemorySink,
        service::{ResolvedWorkflow, WorkflowLookup},
    };

    /// Reports each execution as running for a set number of queries, then completed.
    struct CountdownService {
        remaining: Mutex<IndexMap<String, u32>>,
        queries: Mutex<u32>,
    }

    impl CountdownService {
        fn new(executions: &[(&str, u32)]) -> Arc<Self> {
            Arc::new(Self {
                remaining: Mutex::new(executions.iter().map(|(id, n)| (id.to_string(), *n)).collect()),
                queries: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ExecutionService for CountdownService {
        async fn resolve_workflow(&self, _: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError> {
            unreachable!("poller never resolves")
        }

        async fn submit_execution(&self, _: &str, _: &ParameterSet) -> Result<String, ProvisionError> {
            unreachable!("poller never submits")
        }

        async fn query_status(&self, _: &str, execution_id: &str) -> Result<ExecutionStatus, ProvisionError> {
            *self.queries.lock().unwrap() += 1;
            let mut remaining = self.remaining.lock().unwrap();
            let left = remaining.get_mut(execution_id).expect("unknown execution");
            let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            if *left > 0 {
                *left -= 1;
                return Ok(ExecutionStatus {
                    state: ExecutionState::Running,
                    started_at: Some(started_at),
                    ended_at: None,
                });
            }
            Ok(ExecutionStatus {
                state: ExecutionState::Completed,
                started_at: Some(started_at),
                ended_at: Some(started_at + chrono::Duration::seconds(42)),
            })
        }

        async fn fetch_output_parameters(&self, _: &str, execution_id: &str) -> Result<IndexMap<String, Value>, ProvisionError> {
            Ok(IndexMap::from([("hostname".to_string(), json!(format!("host-{execution_id}")))]))
        }
    }

    fn registry(executions: &[(&str, &str)]) -> JobRegistry {
        let mut registry = JobRegistry::new();
        for (workflow_id, execution_id) in executions {
            registry.record(workflow_id, execution_id);
        }
        registry
    }

    fn fast() -> WatchOptions {
        WatchOptions {
            interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tick_moves_through_polling_draining_done() {
        let service = CountdownService::new(&[("e1", 0), ("e2", 1)]);
        let sink = MemorySink::new();
        let mut poller = ExecutionPoller::new(service, registry(&[("wf", "e1"), ("wf", "e2")]), fast(), &sink);
        assert_eq!(poller.state(), PollerState::Polling);

        assert_eq!(poller.tick().await.unwrap(), PollerState::Draining);
        assert!(!poller.registry().contains("wf", "e1"));
        assert!(poller.registry().contains("wf", "e2"));

        assert_eq!(poller.tick().await.unwrap(), PollerState::Done);
        assert!(poller.registry().is_empty());
    }

    #[tokio::test]
    async fn run_reports_run_time_and_outputs() {
        let service = CountdownService::new(&[("e1", 0), ("e2", 0)]);
        let sink = MemorySink::new();
        let poller = ExecutionPoller::new(service, registry(&[("wf-a", "e1"), ("wf-b", "e2")]), fast(), &sink);

        let report = poller.run(Utc::now(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.ticks, 1);
        assert_eq!(report.finished.len(), 2);
        assert_eq!(report.finished[0].run_time, Some(chrono::Duration::seconds(42)));
        assert_eq!(report.finished[1].outputs.get("hostname"), Some(&json!("host-e2")));
        assert!(matches!(sink.events().last(), Some(ProvisionEvent::WatchCompleted { .. })));
    }

    #[tokio::test]
    async fn empty_registry_finishes_without_ticking() {
        let service = CountdownService::new(&[]);
        let sink = MemorySink::new();
        let poller = ExecutionPoller::new(Arc::clone(&service) as Arc<dyn ExecutionService>, JobRegistry::new(), fast(), &sink);
        assert_eq!(poller.state(), PollerState::Done);

        let report = poller.run(Utc::now(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.ticks, 0);
        assert_eq!(*service.queries.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn tick_limit_stops_the_watch() {
        let service = CountdownService::new(&[("e1", 10)]);
        let sink = MemorySink::new();
        let options = WatchOptions {
            max_ticks: Some(2),
            ..fast()
        };
        let poller = ExecutionPoller::new(service, registry(&[("wf", "e1")]), options, &sink);

        let error = poller.run(Utc::now(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::WatchLimitReached { outstanding: 1, .. }));
    }

    #[tokio::test]
    async fn duration_limit_stops_the_watch() {
        let service = CountdownService::new(&[("e1", u32::MAX)]);
        let sink = MemorySink::new();
        let options = WatchOptions {
            interval: Duration::from_secs(60),
            max_ticks: None,
            max_duration: Some(Duration::from_millis(5)),
        };
        let poller = ExecutionPoller::new(service, registry(&[("wf", "e1")]), options, &sink);

        let error = poller.run(Utc::now(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::WatchLimitReached { .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() {
        let service = CountdownService::new(&[("e1", 0)]);
        let sink = MemorySink::new();
        let options = WatchOptions {
            interval: Duration::from_secs(60),
            ..Default::default()
        };
        let poller = ExecutionPoller::new(Arc::clone(&service) as Arc<dyn ExecutionService>, registry(&[("wf", "e1")]), options, &sink);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = poller.run(Utc::now(), &cancel).await.unwrap_err();
        assert!(matches!(error, ProvisionError::Cancelled { outstanding: 1 }));
        assert_eq!(*service.queries.lock().unwrap(), 0);
    }

    enum Failure {
        Status,
        Outputs,
    }

    struct FailingService(Failure);

    #[async_trait]
    impl ExecutionService for FailingService {
        async fn resolve_workflow(&self, _: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError> {
            unreachable!("poller never resolves")
        }

        async fn submit_execution(&self, _: &str, _: &ParameterSet) -> Result<String, ProvisionError> {
            unreachable!("poller never submits")
        }

        async fn query_status(&self, _: &str, _: &str) -> Result<ExecutionStatus, ProvisionError> {
            match self.0 {
                Failure::Status => Err(ProvisionError::remote("query execution status", "HTTP 503")),
                Failure::Outputs => Ok(ExecutionStatus {
                    state: ExecutionState::Completed,
                    started_at: None,
                    ended_at: None,
                }),
            }
        }

        async fn fetch_output_parameters(&self, _: &str, _: &str) -> Result<IndexMap<String, Value>, ProvisionError> {
            Err(ProvisionError::remote("fetch output parameters", "HTTP 503"))
        }
    }

    /// Status queries never answer.
    struct HangingService;

    #[async_trait]
    impl ExecutionService for HangingService {
        async fn resolve_workflow(&self, _: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError> {
            unreachable!("poller never resolves")
        }

        async fn submit_execution(&self, _: &str, _: &ParameterSet) -> Result<String, ProvisionError> {
            unreachable!("poller never submits")
        }

        async fn query_status(&self, _: &str, _: &str) -> Result<ExecutionStatus, ProvisionError> {
            future::pending().await
        }

        async fn fetch_output_parameters(&self, _: &str, _: &str) -> Result<IndexMap<String, Value>, ProvisionError> {
            future::pending().await
        }
    }

    #[tokio::test]
    async fn status_query_failure_aborts_the_watch() {
        let sink = MemorySink::new();
        let poller = ExecutionPoller::new(Arc::new(FailingService(Failure::Status)), registry(&[("wf", "e1")]), fast(), &sink);

        let error = poller.run(Utc::now(), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(error, ProvisionError::Remote { ref operation, .. } if operation == "query execution status"));
        assert!(!sink.events().iter().any(|event| matches!(event, ProvisionEvent::WatchCompleted { .. })));
    }

    #[tokio::test]
    async fn output_fetch_failure_keeps_the_execution_outstanding() {
        let sink = MemorySink::new();
        let mut poller = ExecutionPoller::new(Arc::new(FailingService(Failure::Outputs)), registry(&[("wf", "e1")]), fast(), &sink);

        let error = poller.tick().await.unwrap_err();

        assert!(matches!(error, ProvisionError::Remote { ref operation, .. } if operation == "fetch output parameters"));
        assert!(poller.registry().contains("wf", "e1"));
        assert!(!sink.events().iter().any(|event| matches!(event, ProvisionEvent::ExecutionFinished { .. })));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_status_query() {
        let sink = MemorySink::new();
        let poller = ExecutionPoller::new(Arc::new(HangingService), registry(&[("wf", "e1"), ("wf", "e2")]), fast(), &sink);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let error = poller.run(Utc::now(), &cancel).await.unwrap_err();

        assert!(matches!(error, ProvisionError::Cancelled { outstanding: 2 }));
        assert!(sink.events().iter().any(|event| matches!(event, ProvisionEvent::WatchTick { tick: 1, .. })));
    }
}
