//! Coding-agent backends for AgentRun
//!
//! This crate runs one task against an external coding-agent CLI (Codex,
//! Claude Code, Gemini CLI or opencode), decodes the program's streamed JSON
//! output into [`NormalizedEvent`]s and folds them into a single
//! [`TaskOutcome`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use agentrun_core::{BackendKind, TaskSpec};
//! use agentrun_sdk::{BackendOptions, TaskRunner, TokioCommandRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run_agent() {
//!     let runner = TaskRunner::new(Arc::new(TokioCommandRunner))
//!         .with_options(BackendOptions { bypass_sandbox: true, model: None })
//!         .with_timeout(Some(Duration::from_secs(600)));
//!
//!     let spec = TaskSpec::new("demo", BackendKind::Claude, "What is 2 + 2?");
//!     let outcome = runner.run(&spec, CancellationToken::new()).await;
//!
//!     println!("Session ID: {}", outcome.session_id);
//! }
//! ```
//!
//! [`NormalizedEvent`]: agentrun_core::NormalizedEvent
//! [`TaskOutcome`]: agentrun_core::TaskOutcome

pub mod backend;
mod error;
mod process;
mod runner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use backend::{backend_for, Backend, BackendOptions, StreamDecoder};
pub use error::{DecodeError, SdkError};
pub use process::{
    CommandRunner, ExecutionFailure, Invocation, ProcessStream, TokioCommandRunner, WaitOutcome,
    EXIT_CANCELLED, EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_TIMEOUT,
};
pub use runner::TaskRunner;
