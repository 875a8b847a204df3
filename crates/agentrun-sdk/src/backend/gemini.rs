//! Gemini CLI (`gemini -o stream-json`).

use agentrun_core::{BackendKind, NormalizedEvent, TaskSpec};
use serde::Deserialize;

use super::{Backend, BackendOptions, SessionTracker, StreamDecoder};
use crate::error::DecodeError;

/// Gemini: resume with `-r <session_id>`, prompt via `-p`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiBackend;

impl Backend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn command(&self) -> &'static str {
        "gemini"
    }

    fn build_args(&self, spec: &TaskSpec, options: &BackendOptions) -> Vec<String> {
        // -y (yolo) is required for non-interactive tool use.
        let mut args = vec![
            "-o".to_string(),
            "stream-json".to_string(),
            "-y".to_string(),
        ];
        if let Some(model) = &options.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        if let Some(session_id) = spec.resume_session() {
            args.push("-r".to_string());
            args.push(session_id.to_string());
        }
        args.push("-p".to_string());
        args.push(spec.task.clone());
        args
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<GeminiDecoder>::default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GeminiEvent {
    Init {
        #[serde(default)]
        session_id: Option<String>,
    },

    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        delta: bool,
        #[serde(default)]
        session_id: Option<String>,
    },

    Error {
        #[serde(default)]
        severity: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    Result {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        error: Option<GeminiError>,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Accumulates streamed assistant deltas into one message.
#[derive(Debug, Default)]
struct GeminiDecoder {
    session: SessionTracker,
    assistant: String,
}

impl StreamDecoder for GeminiDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedEvent>, DecodeError> {
        let event: GeminiEvent = serde_json::from_str(line.trim())?;
        let mut events = Vec::new();

        match event {
            GeminiEvent::Init { session_id } => {
                self.session.observe(session_id.as_deref(), &mut events);
            }
            GeminiEvent::Message {
                role,
                content,
                delta,
                session_id,
            } => {
                self.session.observe(session_id.as_deref(), &mut events);
                let content = content.filter(|c| !c.is_empty());
                if let (Some("assistant"), Some(content)) = (role.as_deref(), content) {
                    if delta {
                        self.assistant.push_str(&content);
                    } else {
                        self.assistant = content;
                    }
                    events.push(NormalizedEvent::message(self.assistant.clone()));
                }
            }
            GeminiEvent::Error { severity, message } => {
                // Warnings are informational; the run continues.
                if let Some(message) = message.filter(|m| !m.is_empty()) {
                    if severity.as_deref() != Some("warning") {
                        events.push(NormalizedEvent::error(message));
                    }
                }
            }
            GeminiEvent::Result {
                status,
                content,
                error,
                session_id,
            } => {
                self.session.observe(session_id.as_deref(), &mut events);
                let status = status.unwrap_or_default();
                if status == "success" {
                    if let Some(text) = content.filter(|t| !t.is_empty()) {
                        events.push(NormalizedEvent::message(text));
                    }
                    events.push(NormalizedEvent::Completed);
                } else {
                    let summary = match error {
                        Some(GeminiError {
                            kind: Some(kind),
                            message: Some(message),
                        }) => format!("{kind}: {message}"),
                        Some(GeminiError {
                            message: Some(message),
                            ..
                        }) => message,
                        _ => format!("gemini finished with status '{status}'"),
                    };
                    events.push(NormalizedEvent::error(summary));
                }
            }
            GeminiEvent::Other => {}
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(lines: &[&str]) -> Vec<NormalizedEvent> {
        let mut decoder = GeminiBackend.decoder();
        lines
            .iter()
            .flat_map(|line| decoder.decode_line(line).unwrap())
            .collect()
    }

    #[test]
    fn test_resume_args() {
        let spec = TaskSpec::new("t", BackendKind::Gemini, "go on").resuming("sid_gemini");
        assert_eq!(
            GeminiBackend.build_args(&spec, &BackendOptions::default()),
            vec!["-o", "stream-json", "-y", "-r", "sid_gemini", "-p", "go on"]
        );
    }

    #[test]
    fn test_result_with_content() {
        let events = decode_all(&[
            r#"{"type":"result","session_id":"sid_gemini","status":"success","content":"OK"}"#,
        ]);
        assert_eq!(
            events,
            vec![
                NormalizedEvent::session("sid_gemini"),
                NormalizedEvent::message("OK"),
                NormalizedEvent::Completed,
            ]
        );
    }

    #[test]
    fn test_streamed_deltas_accumulate() {
        let events = decode_all(&[
            r#"{"type":"init","session_id":"g1","model":"gemini-2.5-pro"}"#,
            r#"{"type":"message","role":"user","content":"hi"}"#,
            r#"{"type":"message","role":"assistant","content":"Hel","delta":true}"#,
            r#"{"type":"message","role":"assistant","content":"lo","delta":true}"#,
            r#"{"type":"result","status":"success","stats":{"total_tokens":3}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                NormalizedEvent::session("g1"),
                NormalizedEvent::message("Hel"),
                NormalizedEvent::message("Hello"),
                NormalizedEvent::Completed,
            ]
        );
    }

    #[test]
    fn test_null_fields_keep_session() {
        let events = decode_all(&[
            r#"{"type":"message","role":"assistant","content":null,"session_id":"g2"}"#,
            r#"{"type":"message","role":null,"content":"ignored"}"#,
            r#"{"type":"result","status":"success","content":null,"session_id":"g2"}"#,
        ]);
        assert_eq!(
            events,
            vec![NormalizedEvent::session("g2"), NormalizedEvent::Completed]
        );
    }

    #[test]
    fn test_error_result() {
        let events = decode_all(&[
            r#"{"type":"error","severity":"warning","message":"loop detected"}"#,
            r#"{"type":"result","status":"error","error":{"type":"FatalAuthenticationError","message":"not logged in"}}"#,
        ]);
        assert_eq!(
            events,
            vec![NormalizedEvent::error(
                "FatalAuthenticationError: not logged in"
            )]
        );
    }
}
