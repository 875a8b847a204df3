//! Drives one task end to end.
//!
//! The runner builds the invocation through the task's backend adapter,
//! starts it through the injected [`CommandRunner`], folds every decoded
//! event into running state and reconciles that state with the process's
//! wait outcome.

use std::sync::Arc;
use std::time::Duration;

use agentrun_core::{NormalizedEvent, TaskOutcome, TaskSpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{backend_for, Backend, BackendOptions};
use crate::process::{CommandRunner, Invocation, WaitOutcome, EXIT_FAILURE};

/// Runs tasks against their backends.
#[derive(Clone)]
pub struct TaskRunner {
    command_runner: Arc<dyn CommandRunner>,
    options: BackendOptions,
    timeout: Option<Duration>,
}

impl TaskRunner {
    /// Create a runner that starts processes through `command_runner`.
    pub fn new(command_runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            command_runner,
            options: BackendOptions::default(),
            timeout: None,
        }
    }

    /// Set the backend options applied to every task.
    pub fn with_options(mut self, options: BackendOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-task timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `spec` with the adapter selected by `spec.backend`.
    pub async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> TaskOutcome {
        self.run_with_backend(spec, backend_for(spec.backend), cancel)
            .await
    }

    /// Run `spec` with an explicit adapter.
    ///
    /// Never fails: every error becomes a failed [`TaskOutcome`].
    pub async fn run_with_backend(
        &self,
        spec: &TaskSpec,
        backend: &dyn Backend,
        cancel: CancellationToken,
    ) -> TaskOutcome {
        if let Err(e) = spec.validate() {
            warn!(task_id = %spec.id, error = %e, "Rejecting invalid task");
            return TaskOutcome::failed(spec.id.clone(), EXIT_FAILURE, e.to_string());
        }

        let program = backend.command();
        let stdin = backend
            .uses_stdin_for_prompt(spec)
            .then(|| spec.task.clone());
        let invocation = Invocation::new(program, backend.build_args(spec, &self.options))
            .with_work_dir(spec.work_dir.clone())
            .with_stdin(stdin)
            .with_timeout(self.timeout);

        info!(
            task_id = %spec.id,
            backend = %backend.kind(),
            mode = %spec.mode,
            task_len = spec.task.len(),
            "Starting task"
        );

        let mut stream = match self.command_runner.run(invocation, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(task_id = %spec.id, error = %e, "Failed to start backend");
                return TaskOutcome::failed(
                    spec.id.clone(),
                    EXIT_FAILURE,
                    format!("{program}: {e}"),
                );
            }
        };

        let mut decoder = backend.decoder();
        let mut state = StreamState::default();
        let mut line_num = 0u64;

        while let Some(line) = stream.next_line().await {
            line_num += 1;
            if line.trim().is_empty() {
                continue;
            }
            match decoder.decode_line(&line) {
                Ok(events) => {
                    for event in events {
                        debug!(task_id = %spec.id, line_num, event = ?event, "Decoded event");
                        state.apply(event);
                    }
                }
                Err(e) => {
                    let preview: String = line.chars().take(200).collect();
                    warn!(
                        task_id = %spec.id,
                        line_num,
                        error = %e,
                        preview = %preview,
                        "Skipping undecodable backend line"
                    );
                }
            }
        }

        let wait = stream.wait().await;
        let outcome = state.into_outcome(spec, program, &wait);

        info!(
            task_id = %spec.id,
            exit_code = outcome.exit_code,
            session_id = %outcome.session_id,
            success = outcome.is_success(),
            "Task finished"
        );
        outcome
    }
}

/// Running fold of one task's events.
#[derive(Debug, Default)]
struct StreamState {
    session_id: Option<String>,
    message: Option<String>,
    error: Option<String>,
    completed: bool,
}

impl StreamState {
    fn apply(&mut self, event: NormalizedEvent) {
        match event {
            NormalizedEvent::SessionStarted { id } => self.session_id = Some(id),
            NormalizedEvent::Message { text } => self.message = Some(text),
            NormalizedEvent::Error { summary } => {
                // The error is what the caller sees as the final word.
                self.message = Some(summary.clone());
                self.error = Some(summary);
            }
            NormalizedEvent::Completed => self.completed = true,
        }
    }

    fn into_outcome(self, spec: &TaskSpec, program: &str, wait: &WaitOutcome) -> TaskOutcome {
        let exit_code = wait.exit_code();
        let mut outcome = TaskOutcome {
            task_id: spec.id.clone(),
            exit_code,
            session_id: self.session_id.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            error: String::new(),
        };

        match (exit_code, self.error) {
            (0, Some(error)) => {
                outcome.exit_code = EXIT_FAILURE;
                outcome.error = error;
            }
            (0, None) if outcome.message.is_empty() => {
                outcome.exit_code = EXIT_FAILURE;
                outcome.error = format!("{program} completed without agent message output");
            }
            (0, None) => {
                if !self.completed {
                    debug!(task_id = %spec.id, "Backend exited cleanly without a completion event");
                }
            }
            (_, Some(error)) => outcome.error = error,
            (_, None) => outcome.error = wait.describe(program),
        }

        outcome
    }
}
