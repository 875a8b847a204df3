//! Normalized events decoded from backend output streams.

use serde::{Deserialize, Serialize};

/// A backend-independent event decoded from one line of streamed output.
///
/// Every backend speaks its own JSON dialect; adapters translate each line
/// into zero or more of these so the task runner can fold them without
/// knowing which program produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEvent {
    /// The backend announced the conversation handle for this run.
    SessionStarted { id: String },

    /// Latest agent message text. Replaces any earlier message.
    Message { text: String },

    /// The backend reported a structured error.
    Error { summary: String },

    /// The backend signalled the end of its turn.
    Completed,
}

impl NormalizedEvent {
    /// Create a SessionStarted event.
    pub fn session(id: impl Into<String>) -> Self {
        Self::SessionStarted { id: id.into() }
    }

    /// Create a Message event.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Create an Error event.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::Error {
            summary: summary.into(),
        }
    }
}
