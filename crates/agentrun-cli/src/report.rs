//! Rendering of task outcomes and batch reports for stdout.

use std::fmt::Write as _;

use agentrun_core::{Summary, TaskOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::orchestrator::BatchReport;

/// Separator between a task's message and its session line.
pub const SESSION_SEPARATOR: &str = "---";

/// Batch report as emitted on stdout in JSON mode.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub results: &'a [TaskOutcome],
    pub summary: Summary,
}

impl<'a> JsonReport<'a> {
    /// Wrap a batch report with the current timestamp.
    pub fn new(report: &'a BatchReport) -> Self {
        Self {
            generated_at: Utc::now(),
            results: &report.results,
            summary: report.summary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Render a single task's result: the message, then the session id if one
/// was observed.
pub fn render_single(outcome: &TaskOutcome) -> String {
    let mut out = String::new();
    if !outcome.message.is_empty() {
        out.push_str(&outcome.message);
        out.push('\n');
    }
    if !outcome.session_id.is_empty() {
        let _ = writeln!(out, "{SESSION_SEPARATOR}");
        let _ = writeln!(out, "SESSION_ID: {}", outcome.session_id);
    }
    out
}

/// Render a batch report for humans.
pub fn render_text(report: &BatchReport) -> String {
    let mut out = String::new();
    for outcome in &report.results {
        let status = if outcome.is_success() { "ok" } else { "FAILED" };
        let _ = writeln!(
            out,
            "=== {} [{}] exit={} ===",
            outcome.task_id, status, outcome.exit_code
        );
        if !outcome.session_id.is_empty() {
            let _ = writeln!(out, "session: {}", outcome.session_id);
        }
        if !outcome.error.is_empty() {
            let _ = writeln!(out, "error: {}", outcome.error);
        }
        if !outcome.message.is_empty() {
            let _ = writeln!(out, "{}", outcome.message);
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "Total: {}  Success: {}  Failed: {}",
        report.summary.total, report.summary.success, report.summary.failed
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::TaskId;

    fn report() -> BatchReport {
        let results = vec![
            TaskOutcome::success(TaskId::new("a"), "s-1", "all done"),
            TaskOutcome::failed(TaskId::new("b"), 127, "codex not found on PATH"),
        ];
        let summary = Summary::from_outcomes(&results);
        BatchReport { results, summary }
    }

    #[test]
    fn test_render_single() {
        let outcome = TaskOutcome::success(TaskId::new("t"), "sid", "line 1\nline 2");
        assert_eq!(
            render_single(&outcome),
            "line 1\nline 2\n---\nSESSION_ID: sid\n"
        );

        let outcome = TaskOutcome::success(TaskId::new("t"), "", "no session");
        assert_eq!(render_single(&outcome), "no session\n");
    }

    #[test]
    fn test_json_report_shape() {
        let report = report();
        let json = JsonReport::new(&report).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["generated_at"].is_string());
        assert_eq!(value["results"][0]["task_id"], "a");
        assert_eq!(value["results"][1]["exit_code"], 127);
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["success"], 1);
        assert_eq!(value["summary"]["failed"], 1);
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&report());
        assert!(text.contains("=== a [ok] exit=0 ==="));
        assert!(text.contains("session: s-1"));
        assert!(text.contains("=== b [FAILED] exit=127 ==="));
        assert!(text.contains("error: codex not found on PATH"));
        assert!(text.ends_with("Total: 2  Success: 1  Failed: 1\n"));
    }
}
