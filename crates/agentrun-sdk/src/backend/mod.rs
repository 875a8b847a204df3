//! Backend adapters.
//!
//! Each supported CLI gets a [`Backend`] that knows its argument conventions
//! and creates a fresh [`StreamDecoder`] per task. Adapters are stateless
//! unit structs; anything that must be remembered across lines lives in the
//! decoder, which a single task owns exclusively.

mod claude;
mod codex;
mod gemini;
mod opencode;

use agentrun_core::{BackendKind, NormalizedEvent, TaskSpec};

use crate::error::DecodeError;

pub use claude::ClaudeBackend;
pub use codex::CodexBackend;
pub use gemini::GeminiBackend;
pub use opencode::OpencodeBackend;

/// Options shared by every task of a run, read once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOptions {
    /// Pass the backend's sandbox/permission bypass flag.
    pub bypass_sandbox: bool,

    /// Model override.
    pub model: Option<String>,
}

/// Argument conventions and stream schema of one external CLI.
pub trait Backend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Program name looked up on PATH.
    fn command(&self) -> &'static str;

    /// Ordered argument list. The task text is always the last argument.
    fn build_args(&self, spec: &TaskSpec, options: &BackendOptions) -> Vec<String>;

    /// Whether the task text is piped on stdin.
    ///
    /// Every supported CLI takes the prompt as its last argument, so the
    /// task's stdin flag never routes the prompt to stdin.
    fn uses_stdin_for_prompt(&self, _spec: &TaskSpec) -> bool {
        false
    }

    /// Fresh decoder for one task's output stream.
    fn decoder(&self) -> Box<dyn StreamDecoder>;
}

/// Per-task decoder for a backend's line-oriented JSON output.
pub trait StreamDecoder: Send {
    /// Decode one line into zero or more events.
    ///
    /// An `Err` means the line was malformed; the caller skips it and keeps
    /// reading.
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedEvent>, DecodeError>;
}

/// Select the adapter for a backend.
pub fn backend_for(kind: BackendKind) -> &'static dyn Backend {
    match kind {
        BackendKind::Codex => &CodexBackend,
        BackendKind::Claude => &ClaudeBackend,
        BackendKind::Gemini => &GeminiBackend,
        BackendKind::Opencode => &OpencodeBackend,
    }
}

/// Tracks the last announced session so repeated ids yield one event.
#[derive(Debug, Default)]
struct SessionTracker {
    current: Option<String>,
}

impl SessionTracker {
    fn observe(&mut self, id: Option<&str>, events: &mut Vec<NormalizedEvent>) {
        let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
            return;
        };
        if self.current.as_deref() != Some(id) {
            self.current = Some(id.to_string());
            events.push(NormalizedEvent::session(id));
        }
    }
}
