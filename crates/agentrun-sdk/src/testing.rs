//! Scripted [`CommandRunner`] for tests.
//!
//! `ScriptedRunner` records every invocation it receives and answers with a
//! canned stdout transcript and wait outcome, so task runner and orchestrator
//! tests never spawn real processes.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::SdkError;
use crate::process::{CommandRunner, ExecutionFailure, Invocation, ProcessStream, WaitOutcome};

/// Canned response for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Lines emitted on stdout, in order.
    pub lines: Vec<String>,
    /// Outcome reported after stdout closes.
    pub outcome: WaitOutcome,
    /// Delay before the first line, to force overlap between tasks.
    pub delay: Option<Duration>,
}

impl Script {
    /// Script whose stdout is `text`, split on newlines.
    pub fn stdout(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Set the wait outcome.
    pub fn with_outcome(mut self, outcome: WaitOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set the start delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = dyn Fn(&Invocation) -> Script + Send + Sync;

/// A [`CommandRunner`] that replays scripts instead of spawning processes.
pub struct ScriptedRunner {
    responder: Box<Responder>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Answer each invocation with `responder(&invocation)`.
    pub fn new(responder: impl Fn(&Invocation) -> Script + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Answer every invocation with the same script.
    pub fn always(script: Script) -> Self {
        Self::new(move |_| script.clone())
    }

    /// Every invocation received so far, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<ProcessStream, SdkError> {
        let script = (self.responder)(&invocation);
        self.invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(invocation);

        let (line_tx, line_rx) = mpsc::channel(script.lines.len().max(1));
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Some(delay) = script.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        drop(line_tx);
                        let _ = exit_tx.send(WaitOutcome::Failed(ExecutionFailure::Cancelled));
                        return;
                    }
                }
            }
            for line in script.lines {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            drop(line_tx);
            let _ = exit_tx.send(script.outcome);
        });

        Ok(ProcessStream::new(line_rx, exit_rx))
    }
}
