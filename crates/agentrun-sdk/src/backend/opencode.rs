//! opencode CLI (`opencode run --format json`).

use agentrun_core::{BackendKind, NormalizedEvent, TaskSpec};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Backend, BackendOptions, SessionTracker, StreamDecoder};
use crate::error::DecodeError;

/// opencode: resume with `-s <session_id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpencodeBackend;

impl Backend for OpencodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Opencode
    }

    fn command(&self) -> &'static str {
        "opencode"
    }

    fn build_args(&self, spec: &TaskSpec, options: &BackendOptions) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = &options.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        if let Some(session_id) = spec.resume_session() {
            args.push("-s".to_string());
            args.push(session_id.to_string());
        }
        args.push(spec.task.clone());
        args
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<OpencodeDecoder>::default()
    }
}

#[derive(Debug, Deserialize)]
struct OpencodeRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "sessionID", default)]
    session_id: Option<String>,
    #[serde(default)]
    part: Option<OpencodePart>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpencodePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default)]
struct OpencodeDecoder {
    session: SessionTracker,
}

impl StreamDecoder for OpencodeDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedEvent>, DecodeError> {
        let record: OpencodeRecord = serde_json::from_str(line.trim())?;

        let body = match record.kind.as_str() {
            "text" => match record.part.and_then(|part| part.text) {
                Some(text) if text.is_empty() => Ok(None),
                Some(text) => Ok(Some(NormalizedEvent::message(text))),
                None => Err(DecodeError::UnexpectedShape(
                    "text record without part.text".to_string(),
                )),
            },
            "step_finish" => {
                let reason = record.part.and_then(|part| part.reason);
                // A tool-calls step is followed by another step.
                Ok((reason.as_deref() != Some("tool-calls")).then_some(NormalizedEvent::Completed))
            }
            "error" => {
                let summary = record
                    .error
                    .as_ref()
                    .map(summarize_error)
                    .unwrap_or_else(|| "opencode reported an unknown error".to_string());
                Ok(Some(NormalizedEvent::error(summary)))
            }
            _ => Ok(None),
        };

        let mut events = Vec::new();
        self.session.observe(record.session_id.as_deref(), &mut events);
        match body {
            Ok(body) => events.extend(body),
            Err(e) if events.is_empty() => return Err(e),
            Err(e) => debug!(error = %e, "Keeping session id from malformed opencode record"),
        }
        Ok(events)
    }
}

/// Human-readable summary of an opencode error object.
///
/// Upstream HTTP failures arrive as an error whose message embeds the
/// provider's JSON error body, e.g.
/// `Unauthorized: {"type":"error","error":{"type":"CreditsError",...}}`.
/// When that inner object carries `type` and `message` the summary is
/// `"<type>: <message>"`; otherwise the outer message is used verbatim.
fn summarize_error(error: &Value) -> String {
    if let Some(text) = error.as_str() {
        return nested_error_summary(text).unwrap_or_else(|| text.to_string());
    }

    let data_message = error.pointer("/data/message").and_then(Value::as_str);
    let response_body = error.pointer("/data/responseBody").and_then(Value::as_str);

    response_body
        .and_then(nested_error_summary)
        .or_else(|| data_message.and_then(nested_error_summary))
        .or_else(|| data_message.map(str::to_string))
        .or_else(|| error.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| error.get("name").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| error.to_string())
}

/// Parse the first JSON object embedded in `raw` and format its error.
fn nested_error_summary(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let value = serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<Value>()
        .next()?
        .ok()?;
    let inner = value
        .get("error")
        .filter(|inner| inner.is_object())
        .unwrap_or(&value);
    let kind = inner.get("type")?.as_str()?;
    let message = inner.get("message")?.as_str()?;
    Some(format!("{kind}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CREDITS_ERROR: &str = r#"{"type":"error","timestamp":1,"sessionID":"ses_err","error":{"name":"APIError","data":{"message":"Unauthorized: {\"type\":\"error\",\"error\":{\"type\":\"CreditsError\",\"message\":\"No payment method\"}}","statusCode":401,"responseBody":"{\"type\":\"error\",\"error\":{\"type\":\"CreditsError\",\"message\":\"No payment method\"}}","metadata":{"url":"https://opencode.ai/zen/v1/responses"}}}}"#;

    #[test]
    fn test_nested_credits_error() {
        let mut decoder = OpencodeBackend.decoder();
        let events = decoder.decode_line(CREDITS_ERROR).unwrap();
        assert_eq!(
            events,
            vec![
                NormalizedEvent::session("ses_err"),
                NormalizedEvent::error("CreditsError: No payment method"),
            ]
        );
    }

    #[test]
    fn test_nested_error_from_message_only() {
        let error = json!({
            "name": "APIError",
            "data": {"message": "Bad Request: {\"type\":\"invalid_request\",\"message\":\"prompt too long\"} (retry later)"}
        });
        assert_eq!(summarize_error(&error), "invalid_request: prompt too long");
    }

    #[test]
    fn test_unparseable_inner_falls_back_to_outer_message() {
        let error = json!({
            "name": "APIError",
            "data": {"message": "Unauthorized: {not json", "responseBody": "<html>502</html>"}
        });
        assert_eq!(summarize_error(&error), "Unauthorized: {not json");

        let error = json!({"name": "ProviderInitError", "data": {}});
        assert_eq!(summarize_error(&error), "ProviderInitError");
    }

    #[test]
    fn test_text_then_step_finish() {
        let mut decoder = OpencodeBackend.decoder();
        let mut events = decoder
            .decode_line(r#"{"type":"step_start","sessionID":"ses_ok","part":{"type":"step-start"}}"#)
            .unwrap();
        events.extend(
            decoder
                .decode_line(r#"{"type":"text","timestamp":1,"sessionID":"ses_ok","part":{"type":"text","text":"OK"}}"#)
                .unwrap(),
        );
        events.extend(
            decoder
                .decode_line(r#"{"type":"step_finish","sessionID":"ses_ok","part":{"type":"step-finish","reason":"tool-calls"}}"#)
                .unwrap(),
        );
        events.extend(
            decoder
                .decode_line(r#"{"type":"step_finish","timestamp":2,"sessionID":"ses_ok","part":{"type":"step-finish","reason":"stop"}}"#)
                .unwrap(),
        );
        assert_eq!(
            events,
            vec![
                NormalizedEvent::session("ses_ok"),
                NormalizedEvent::message("OK"),
                NormalizedEvent::Completed,
            ]
        );
    }

    #[test]
    fn test_text_without_part_still_reports_session() {
        let mut decoder = OpencodeBackend.decoder();
        let events = decoder
            .decode_line(r#"{"type":"text","sessionID":"ses_1"}"#)
            .unwrap();
        assert_eq!(events, vec![NormalizedEvent::session("ses_1")]);

        // Session already known: nothing left to keep, so the line is malformed.
        let err = decoder.decode_line(r#"{"type":"text","sessionID":"ses_1"}"#);
        assert!(matches!(err, Err(DecodeError::UnexpectedShape(_))));
    }
}
