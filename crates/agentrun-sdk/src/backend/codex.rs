//! OpenAI Codex CLI (`codex e --json`).

use agentrun_core::{BackendKind, NormalizedEvent, TaskSpec};
use serde::Deserialize;

use super::{Backend, BackendOptions, SessionTracker, StreamDecoder};
use crate::error::DecodeError;

/// Codex: resume is the `resume <thread_id>` sub-command.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexBackend;

impl Backend for CodexBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
    }

    fn command(&self) -> &'static str {
        "codex"
    }

    fn build_args(&self, spec: &TaskSpec, options: &BackendOptions) -> Vec<String> {
        let mut args = vec!["e".to_string()];
        if options.bypass_sandbox {
            args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        }
        args.push("--skip-git-repo-check".to_string());
        if let Some(model) = &options.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }

        match spec.resume_session() {
            Some(session_id) => {
                args.push("--json".to_string());
                args.push("resume".to_string());
                args.push(session_id.to_string());
            }
            None => {
                args.push("-C".to_string());
                args.push(spec.work_dir.display().to_string());
                args.push("--json".to_string());
            }
        }

        args.push(spec.task.clone());
        args
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<CodexDecoder>::default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CodexEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },

    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },

    #[serde(rename = "turn.completed")]
    TurnCompleted {},

    #[serde(rename = "turn.failed")]
    TurnFailed { error: CodexError },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CodexItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodexError {
    message: String,
}

/// Joins every completed agent message of the run.
#[derive(Debug, Default)]
struct CodexDecoder {
    session: SessionTracker,
    messages: Vec<String>,
}

impl StreamDecoder for CodexDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedEvent>, DecodeError> {
        let event: CodexEvent = serde_json::from_str(line.trim())?;
        let mut events = Vec::new();

        match event {
            CodexEvent::ThreadStarted { thread_id } => {
                self.session.observe(Some(&thread_id), &mut events);
            }
            CodexEvent::ItemCompleted { item } => {
                if item.kind == "agent_message" {
                    if let Some(text) = item.text.filter(|t| !t.is_empty()) {
                        self.messages.push(text);
                        events.push(NormalizedEvent::message(self.messages.join("\n")));
                    }
                }
            }
            CodexEvent::TurnCompleted {} => events.push(NormalizedEvent::Completed),
            CodexEvent::TurnFailed { error } => events.push(NormalizedEvent::error(error.message)),
            CodexEvent::Error { message } => events.push(NormalizedEvent::error(message)),
            CodexEvent::Other => {}
        }

        Ok(events)
    }
}
