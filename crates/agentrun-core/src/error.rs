//! Core domain errors.

use thiserror::Error;

use crate::ids::TaskId;

/// Core domain errors for AgentRun.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Backend name does not match any supported backend.
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// Resume mode was requested without a session to resume.
    #[error("Task '{0}' is in resume mode but has no session_id")]
    MissingSessionId(TaskId),

    /// Task text is empty.
    #[error("Task '{0}' has empty task text")]
    EmptyTask(TaskId),
}
