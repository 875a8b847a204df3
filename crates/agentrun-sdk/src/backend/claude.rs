//! Claude Code CLI (`claude -p --output-format stream-json`).

use agentrun_core::{BackendKind, NormalizedEvent, TaskSpec};
use serde::Deserialize;
use serde_json::Value;

use super::{Backend, BackendOptions, SessionTracker, StreamDecoder};
use crate::error::DecodeError;

/// Claude Code: resume with `-r <session_id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeBackend;

impl Backend for ClaudeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    fn command(&self) -> &'static str {
        "claude"
    }

    fn build_args(&self, spec: &TaskSpec, options: &BackendOptions) -> Vec<String> {
        let mut args = vec!["-p".to_string()];
        if options.bypass_sandbox {
            args.push("--dangerously-skip-permissions".to_string());
        }
        // Ignore user/project settings so hooks cannot interfere with the run.
        args.push("--setting-sources".to_string());
        args.push(String::new());

        if let Some(model) = &options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(session_id) = spec.resume_session() {
            args.push("-r".to_string());
            args.push(session_id.to_string());
        }

        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        args.push("--verbose".to_string());
        args.push(spec.task.clone());
        args
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<ClaudeDecoder>::default()
    }
}

/// Top-level message from Claude Code stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeMessage {
    /// System initialization message.
    System {
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Assistant response message.
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// User message (tool results echo).
    User {
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Execution result.
    Result {
        #[serde(default, alias = "isError")]
        is_error: Option<bool>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, alias = "sessionId")]
        session_id: Option<String>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default)]
struct ClaudeDecoder {
    session: SessionTracker,
}

impl StreamDecoder for ClaudeDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedEvent>, DecodeError> {
        let message: ClaudeMessage = serde_json::from_str(line.trim())?;
        let mut events = Vec::new();

        match message {
            ClaudeMessage::System { session_id } | ClaudeMessage::User { session_id } => {
                self.session.observe(session_id.as_deref(), &mut events);
            }
            ClaudeMessage::Assistant {
                message,
                session_id,
            } => {
                self.session.observe(session_id.as_deref(), &mut events);
                let text: Vec<String> = message
                    .content
                    .into_iter()
                    .filter_map(|item| match item {
                        ContentItem::Text { text } if !text.is_empty() => Some(text),
                        _ => None,
                    })
                    .collect();
                if !text.is_empty() {
                    events.push(NormalizedEvent::message(text.join("\n")));
                }
            }
            ClaudeMessage::Result {
                is_error,
                subtype,
                result,
                error,
                session_id,
            } => {
                self.session.observe(session_id.as_deref(), &mut events);
                let result = result.and_then(|value| match value {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                });

                if is_error.unwrap_or(false) {
                    let summary = error
                        .or(result)
                        .or(subtype)
                        .unwrap_or_else(|| "claude reported an error".to_string());
                    events.push(NormalizedEvent::error(summary));
                } else {
                    if let Some(text) = result.filter(|t| !t.is_empty()) {
                        events.push(NormalizedEvent::message(text));
                    }
                    events.push(NormalizedEvent::Completed);
                }
            }
            ClaudeMessage::Other => {}
        }

        Ok(events)
    }
}
