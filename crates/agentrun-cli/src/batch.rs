//! Batch description parser.
//!
//! A batch is a sequence of blocks:
//!
//! ```text
//! ---TASK---
//! id: fix-login
//! backend: claude
//! session_id: 3f2a...
//! ---CONTENT---
//! Free-form task text.
//! Newlines are preserved.
//! ---TASK---
//! ...
//! ```
//!
//! Parsing never fails as a whole: each block yields either a runnable
//! [`TaskSpec`] or the error that disqualified it, so one bad block does not
//! take its siblings down.

use std::collections::HashSet;
use std::path::PathBuf;

use agentrun_core::{BackendKind, CoreError, TaskId, TaskMode, TaskSpec};
use thiserror::Error;

/// Opens a task block.
pub const TASK_DELIMITER: &str = "---TASK---";
/// Separates block metadata from task text.
pub const CONTENT_DELIMITER: &str = "---CONTENT---";

/// Why a block could not become a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Block {block}: missing '---CONTENT---' delimiter")]
    MissingContentDelimiter { block: usize },

    #[error("Block {block}: expected 'key: value', got '{line}'")]
    MalformedLine { block: usize, line: String },

    #[error("Block {block}: unknown metadata key '{key}'")]
    UnknownKey { block: usize, key: String },

    #[error("Block {block}: invalid {key} '{value}'")]
    InvalidValue {
        block: usize,
        key: &'static str,
        value: String,
    },

    #[error("Duplicate task id '{0}'")]
    DuplicateId(TaskId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// One parsed block.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    /// Block is valid and ready to run.
    Ready(TaskSpec),
    /// Block was rejected before execution.
    Invalid { id: TaskId, error: BatchError },
}

impl BatchEntry {
    /// The task id this entry reports under.
    pub fn id(&self) -> &TaskId {
        match self {
            Self::Ready(spec) => &spec.id,
            Self::Invalid { id, .. } => id,
        }
    }
}

/// Values applied to blocks that do not set them.
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub backend: BackendKind,
    pub work_dir: PathBuf,
    pub use_stdin: bool,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            work_dir: PathBuf::from("."),
            use_stdin: false,
        }
    }
}

/// Parse a batch description into one entry per block, in input order.
pub fn parse_batch(input: &str, defaults: &BatchDefaults) -> Vec<BatchEntry> {
    let mut seen = HashSet::new();
    split_blocks(input)
        .into_iter()
        .enumerate()
        .map(|(index, lines)| {
            let block = index + 1;
            let (id, parsed) = parse_block(block, &lines, defaults);
            let id = id.unwrap_or_else(TaskId::generate);

            if !seen.insert(id.clone()) {
                return BatchEntry::Invalid {
                    error: BatchError::DuplicateId(id.clone()),
                    id,
                };
            }

            match parsed.and_then(|mut spec| {
                spec.id = id.clone();
                spec.validate()?;
                Ok(spec)
            }) {
                Ok(spec) => BatchEntry::Ready(spec),
                Err(error) => BatchEntry::Invalid { id, error },
            }
        })
        .collect()
}

/// Group lines by block, dropping anything before the first delimiter.
fn split_blocks(input: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in input.lines() {
        if line.trim() == TASK_DELIMITER {
            blocks.push(Vec::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }
    blocks
}

/// Parse one block. The id is returned separately so a rejected block can
/// still be reported under the id it declared.
fn parse_block(
    block: usize,
    lines: &[&str],
    defaults: &BatchDefaults,
) -> (Option<TaskId>, Result<TaskSpec, BatchError>) {
    let Some(split) = lines.iter().position(|l| l.trim() == CONTENT_DELIMITER) else {
        let id = lines.iter().find_map(|line| match line.split_once(':') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("id") => {
                non_empty(value).map(TaskId::new)
            }
            _ => None,
        });
        return (id, Err(BatchError::MissingContentDelimiter { block }));
    };

    let mut id = None;
    let mut backend = defaults.backend;
    let mut session_id = None;
    let mut work_dir = defaults.work_dir.clone();
    let mut mode = None;
    let mut use_stdin = defaults.use_stdin;
    let mut first_error = None;

    for line in lines[..split].iter().filter(|l| !l.trim().is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            first_error.get_or_insert(BatchError::MalformedLine {
                block,
                line: line.trim().to_string(),
            });
            continue;
        };
        let value = value.trim();
        let invalid = |key: &'static str| BatchError::InvalidValue {
            block,
            key,
            value: value.to_string(),
        };

        let result = match key.trim().to_ascii_lowercase().as_str() {
            "id" => {
                id = non_empty(value).map(TaskId::new);
                Ok(())
            }
            "backend" => value
                .parse::<BackendKind>()
                .map(|kind| backend = kind)
                .map_err(|_| invalid("backend")),
            "session_id" => {
                session_id = non_empty(value).map(str::to_string);
                Ok(())
            }
            "workdir" => {
                if let Some(dir) = non_empty(value) {
                    work_dir = PathBuf::from(dir);
                }
                Ok(())
            }
            "mode" => match value.to_ascii_lowercase().as_str() {
                "new" => {
                    mode = Some(TaskMode::New);
                    Ok(())
                }
                "resume" => {
                    mode = Some(TaskMode::Resume);
                    Ok(())
                }
                _ => Err(invalid("mode")),
            },
            "stdin" => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => {
                    use_stdin = true;
                    Ok(())
                }
                "false" | "no" | "0" => {
                    use_stdin = false;
                    Ok(())
                }
                _ => Err(invalid("stdin")),
            },
            other => Err(BatchError::UnknownKey {
                block,
                key: other.to_string(),
            }),
        };
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    if let Some(error) = first_error {
        return (id, Err(error));
    }

    let mode = mode.unwrap_or(if session_id.is_some() {
        TaskMode::Resume
    } else {
        TaskMode::New
    });

    let spec = TaskSpec {
        id: id.clone().unwrap_or_else(|| TaskId::new("")),
        backend,
        task: block_content(&lines[split + 1..]),
        work_dir,
        mode,
        session_id,
        use_stdin,
    };
    (id, Ok(spec))
}

/// Join content lines, dropping one leading and one trailing blank line.
fn block_content(lines: &[&str]) -> String {
    let content = lines.join("\n");
    let content = content.strip_prefix('\n').unwrap_or(&content);
    let content = content.strip_suffix('\n').unwrap_or(content);
    content.to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<BatchEntry> {
        parse_batch(input, &BatchDefaults::default())
    }

    fn ready(entry: &BatchEntry) -> &TaskSpec {
        match entry {
            BatchEntry::Ready(spec) => spec,
            BatchEntry::Invalid { id, error } => panic!("{id} rejected: {error}"),
        }
    }

    fn rejected(entry: &BatchEntry) -> &BatchError {
        match entry {
            BatchEntry::Invalid { error, .. } => error,
            BatchEntry::Ready(spec) => panic!("{} unexpectedly accepted", spec.id),
        }
    }

    #[test]
    fn test_parse_blocks() {
        let input = "\
preamble is ignored
---TASK---
id: a
backend: claude
---CONTENT---
first task
---TASK---
id: b
backend: opencode
session_id: ses_1
workdir: /tmp
---CONTENT---
line one

line three
";
        let entries = parse(input);
        assert_eq!(entries.len(), 2);

        let a = ready(&entries[0]);
        assert_eq!(a.id.as_str(), "a");
        assert_eq!(a.backend, BackendKind::Claude);
        assert_eq!(a.mode, TaskMode::New);
        assert_eq!(a.task, "first task");

        let b = ready(&entries[1]);
        assert_eq!(b.backend, BackendKind::Opencode);
        assert_eq!(b.mode, TaskMode::Resume);
        assert_eq!(b.resume_session(), Some("ses_1"));
        assert_eq!(b.work_dir, PathBuf::from("/tmp"));
        assert_eq!(b.task, "line one\n\nline three");
    }

    #[test]
    fn test_defaults_apply() {
        let defaults = BatchDefaults {
            backend: BackendKind::Gemini,
            work_dir: PathBuf::from("/work"),
            use_stdin: true,
        };
        let entries = parse_batch("---TASK---\nid: x\n---CONTENT---\ndo it", &defaults);
        let spec = ready(&entries[0]);
        assert_eq!(spec.backend, BackendKind::Gemini);
        assert_eq!(spec.work_dir, PathBuf::from("/work"));
        assert!(spec.use_stdin);
    }

    #[test]
    fn test_missing_id_is_generated() {
        let entries = parse("---TASK---\n---CONTENT---\none\n---TASK---\n---CONTENT---\ntwo");
        let first = ready(&entries[0]);
        let second = ready(&entries[1]);
        assert!(!first.id.as_str().is_empty());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_resume_without_session_fails_block_only() {
        let input = "\
---TASK---
id: bad
mode: resume
---CONTENT---
continue
---TASK---
id: good
---CONTENT---
start
";
        let entries = parse(input);
        assert_eq!(entries[0].id().as_str(), "bad");
        assert_eq!(
            rejected(&entries[0]),
            &BatchError::Core(CoreError::MissingSessionId(TaskId::new("bad")))
        );
        assert_eq!(ready(&entries[1]).id.as_str(), "good");
    }

    #[test]
    fn test_explicit_new_mode_ignores_session() {
        let entries = parse("---TASK---\nsession_id: s1\nmode: new\n---CONTENT---\nhi");
        let spec = ready(&entries[0]);
        assert_eq!(spec.mode, TaskMode::New);
        assert_eq!(spec.resume_session(), None);
    }

    #[test]
    fn test_duplicate_id_rejects_later_block() {
        let input = "---TASK---\nid: a\n---CONTENT---\none\n---TASK---\nid: a\n---CONTENT---\ntwo";
        let entries = parse(input);
        assert_eq!(ready(&entries[0]).task, "one");
        assert_eq!(
            rejected(&entries[1]),
            &BatchError::DuplicateId(TaskId::new("a"))
        );
    }

    #[test]
    fn test_block_errors() {
        let input = "\
---TASK---
id: no-content
---TASK---
id: unknown
colour: blue
---CONTENT---
x
---TASK---
id: backend
backend: cursor
---CONTENT---
x
---TASK---
id: malformed
just words
---CONTENT---
x
---TASK---
id: empty
---CONTENT---

";
        let entries = parse(input);
        assert_eq!(entries.len(), 5);
        assert_eq!(
            rejected(&entries[0]),
            &BatchError::MissingContentDelimiter { block: 1 }
        );
        assert_eq!(entries[0].id().as_str(), "no-content");
        assert!(matches!(rejected(&entries[1]), BatchError::UnknownKey { key, .. } if key == "colour"));
        assert!(matches!(
            rejected(&entries[2]),
            BatchError::InvalidValue { key: "backend", .. }
        ));
        assert!(matches!(rejected(&entries[3]), BatchError::MalformedLine { .. }));
        assert!(matches!(
            rejected(&entries[4]),
            BatchError::Core(CoreError::EmptyTask(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("no delimiters here").is_empty());
    }
}
