//! AgentRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Process spawning
//! - Async runtimes
//! - Any particular coding-agent CLI
//!
//! All types here describe what a task is, what a backend reports while
//! running it, and what the task finally produced.

pub mod backend;
pub mod error;
pub mod event;
pub mod ids;
pub mod outcome;
pub mod task;

// Re-export commonly used types
pub use backend::BackendKind;
pub use error::CoreError;
pub use event::NormalizedEvent;
pub use ids::TaskId;
pub use outcome::{Summary, TaskOutcome};
pub use task::{TaskMode, TaskSpec};
