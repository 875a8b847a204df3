//! Error types for the AgentRun SDK.

use thiserror::Error;

/// Errors that can occur before a backend process starts streaming.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Failed to spawn the backend process.
    #[error("Failed to spawn backend process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Process setup failed (missing pipes, bad working directory).
    #[error("Backend process IO error: {0}")]
    Io(String),
}

/// A streamed line that could not be decoded. Never fatal.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Line is not valid JSON for the backend's schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but a required field was missing or mistyped.
    #[error("Unexpected record shape: {0}")]
    UnexpectedShape(String),
}
