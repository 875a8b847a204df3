//! Library half of the `agentrun` command: configuration, batch parsing,
//! orchestration and report rendering.

pub mod batch;
pub mod config;
pub mod orchestrator;
pub mod report;

pub use batch::{parse_batch, BatchDefaults, BatchEntry, BatchError};
pub use config::{Config, ConfigError};
pub use orchestrator::{BatchReport, Orchestrator};
pub use report::{render_single, render_text, JsonReport};
