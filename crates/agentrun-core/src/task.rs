//! Task specification types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{BackendKind, CoreError, TaskId};

/// Whether a task starts a new conversation or continues an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Start a fresh conversation.
    #[default]
    New,
    /// Continue the conversation named by `TaskSpec::session_id`.
    Resume,
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Resume => f.write_str("resume"),
        }
    }
}

/// A single unit of work for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task identifier, unique within a batch.
    pub id: TaskId,

    /// Backend that runs this task.
    pub backend: BackendKind,

    /// Natural-language task text. May contain newlines.
    pub task: String,

    /// Working directory for the backend process.
    pub work_dir: PathBuf,

    /// New conversation or resume.
    pub mode: TaskMode,

    /// Session to resume. Required iff `mode` is `Resume`.
    pub session_id: Option<String>,

    /// Input-channel flag. The task text is always passed as an argument
    /// and is never written to the backend's stdin.
    pub use_stdin: bool,
}

impl TaskSpec {
    /// Create a new-conversation task running in the current directory.
    pub fn new(id: impl Into<TaskId>, backend: BackendKind, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend,
            task: task.into(),
            work_dir: PathBuf::from("."),
            mode: TaskMode::New,
            session_id: None,
            use_stdin: false,
        }
    }

    /// Builder method to resume an existing session.
    pub fn resuming(mut self, session_id: impl Into<String>) -> Self {
        self.mode = TaskMode::Resume;
        self.session_id = Some(session_id.into());
        self
    }

    /// Builder method to set the working directory.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Builder method to request stdin delivery.
    pub fn with_stdin(mut self, use_stdin: bool) -> Self {
        self.use_stdin = use_stdin;
        self
    }

    /// Session id to resume, if this is a resume task with a usable id.
    pub fn resume_session(&self) -> Option<&str> {
        match self.mode {
            TaskMode::Resume => self.session_id.as_deref().filter(|s| !s.trim().is_empty()),
            TaskMode::New => None,
        }
    }

    /// Check the task's invariants before execution.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.task.trim().is_empty() {
            return Err(CoreError::EmptyTask(self.id.clone()));
        }
        if self.mode == TaskMode::Resume && self.resume_session().is_none() {
            return Err(CoreError::MissingSessionId(self.id.clone()));
        }
        Ok(())
    }
}
