//! Task outcome and batch summary types.

use serde::{Deserialize, Serialize};

use crate::TaskId;

/// Final result of running one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task identifier.
    pub task_id: TaskId,

    /// Process exit code; 0 means success.
    pub exit_code: i32,

    /// Last session id the backend reported, empty if none.
    pub session_id: String,

    /// Final agent message.
    pub message: String,

    /// Error text, empty on success.
    pub error: String,
}

impl TaskOutcome {
    /// Create a successful outcome.
    pub fn success(
        task_id: TaskId,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            exit_code: 0,
            session_id: session_id.into(),
            message: message.into(),
            error: String::new(),
        }
    }

    /// Create a failed outcome that never reached the backend.
    pub fn failed(task_id: TaskId, exit_code: i32, error: impl Into<String>) -> Self {
        Self {
            task_id,
            exit_code,
            session_id: String::new(),
            message: String::new(),
            error: error.into(),
        }
    }

    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_empty()
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl Summary {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Build a summary from a complete set of outcomes.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TaskOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    /// Returns true if every counted task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            TaskOutcome::success(TaskId::new("a"), "s1", "ok"),
            TaskOutcome::failed(TaskId::new("b"), 7, "boom"),
            TaskOutcome::success(TaskId::new("c"), "", "ok"),
        ];
        let summary = Summary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, summary.success + summary.failed);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_zero_exit_with_error_is_failure() {
        let mut outcome = TaskOutcome::success(TaskId::new("a"), "", "ok");
        outcome.error = "backend error".to_string();
        assert!(!outcome.is_success());
    }
}
