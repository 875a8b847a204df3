//! Batch orchestration: fan tasks out, gather their outcomes.

use std::sync::Arc;

use agentrun_core::{Summary, TaskId, TaskOutcome, TaskSpec};
use agentrun_sdk::{TaskRunner, EXIT_CANCELLED, EXIT_FAILURE};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::BatchEntry;

/// Outcomes of a batch, in input order, with their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<TaskOutcome>,
    pub summary: Summary,
}

impl BatchReport {
    /// Returns true if every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.summary.all_succeeded()
    }
}

/// The one place outcomes are written to. Owned by the collecting loop, so
/// concurrent task completions are serialized through its channel.
struct Accumulator {
    ids: Vec<TaskId>,
    slots: Vec<Option<TaskOutcome>>,
    summary: Summary,
}

impl Accumulator {
    fn new(ids: Vec<TaskId>) -> Self {
        let slots = vec![None; ids.len()];
        Self {
            ids,
            slots,
            summary: Summary::default(),
        }
    }

    fn record(&mut self, index: usize, outcome: TaskOutcome) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.is_some() {
            warn!(task_id = %outcome.task_id, "Ignoring second outcome for task");
            return;
        }
        self.summary.record(&outcome);
        *slot = Some(outcome);
    }

    fn completed(&self) -> usize {
        self.summary.total
    }

    /// Fill any slot whose task never reported, then emit the report.
    fn finish(mut self) -> BatchReport {
        for index in 0..self.slots.len() {
            if self.slots[index].is_none() {
                let outcome = TaskOutcome::failed(
                    self.ids[index].clone(),
                    EXIT_FAILURE,
                    "task terminated without reporting an outcome",
                );
                self.record(index, outcome);
            }
        }
        BatchReport {
            results: self.slots.into_iter().flatten().collect(),
            summary: self.summary,
        }
    }
}

/// Runs single tasks and batches on top of a [`TaskRunner`].
#[derive(Clone)]
pub struct Orchestrator {
    runner: TaskRunner,
    max_parallel: usize,
}

impl Orchestrator {
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            runner,
            max_parallel: 0,
        }
    }

    /// Bound how many tasks run at once. 0 means unbounded.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Run one task.
    pub async fn run_single(&self, spec: &TaskSpec, cancel: CancellationToken) -> TaskOutcome {
        self.runner.run(spec, cancel).await
    }

    /// Run every entry of a batch concurrently.
    ///
    /// Never fails: rejected blocks, execution failures, cancellation and
    /// panics all become failed outcomes. Results come back in input order.
    pub async fn run_batch(
        &self,
        entries: Vec<BatchEntry>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let total = entries.len();
        let ids = entries.iter().map(|e| e.id().clone()).collect();
        let mut accumulator = Accumulator::new(ids);

        let semaphore =
            (self.max_parallel > 0).then(|| Arc::new(Semaphore::new(self.max_parallel)));
        let (tx, mut rx) = mpsc::channel::<(usize, TaskOutcome)>(total.max(1));
        let mut tasks = JoinSet::new();

        info!(
            tasks = total,
            max_parallel = self.max_parallel,
            "Starting batch"
        );

        for (index, entry) in entries.into_iter().enumerate() {
            let spec = match entry {
                BatchEntry::Ready(spec) => spec,
                BatchEntry::Invalid { id, error } => {
                    warn!(task_id = %id, error = %error, "Rejected batch entry");
                    let outcome = TaskOutcome::failed(id, EXIT_FAILURE, error.to_string());
                    accumulator.record(index, outcome);
                    continue;
                }
            };

            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.child_token();
            let tx = tx.clone();

            tasks.spawn(async move {
                let outcome = run_permitted(runner, spec, semaphore, cancel).await;
                let _ = tx.send((index, outcome)).await;
            });
        }
        drop(tx);

        while let Some((index, outcome)) = rx.recv().await {
            info!(
                task_id = %outcome.task_id,
                exit_code = outcome.exit_code,
                completed = accumulator.completed() + 1,
                total,
                "Task finished"
            );
            accumulator.record(index, outcome);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Batch task did not complete");
            }
        }

        let report = accumulator.finish();
        info!(
            total = report.summary.total,
            success = report.summary.success,
            failed = report.summary.failed,
            "Batch finished"
        );
        report
    }
}

async fn run_permitted(
    runner: TaskRunner,
    spec: TaskSpec,
    semaphore: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
) -> TaskOutcome {
    let _permit = match semaphore {
        Some(semaphore) => tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return TaskOutcome::failed(
                    spec.id,
                    EXIT_CANCELLED,
                    "task was cancelled before it started",
                );
            }
            permit = semaphore.acquire_owned() => permit.ok(),
        },
        None => None,
    };
    runner.run(&spec, cancel).await
}
