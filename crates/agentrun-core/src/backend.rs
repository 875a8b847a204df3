//! Supported backend selectors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// One of the supported external coding-agent programs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI Codex CLI (`codex e --json`).
    #[default]
    Codex,
    /// Anthropic Claude Code CLI (`claude -p --output-format stream-json`).
    Claude,
    /// Google Gemini CLI (`gemini -o stream-json`).
    Gemini,
    /// opencode CLI (`opencode run --format json`).
    Opencode,
}

impl BackendKind {
    /// All supported backends, in a stable order.
    pub const ALL: [BackendKind; 4] = [Self::Codex, Self::Claude, Self::Gemini, Self::Opencode];

    /// Lowercase name used in batch files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Opencode => "opencode",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "opencode" => Ok(Self::Opencode),
            other => Err(CoreError::UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert_eq!(" opencode ".parse::<BackendKind>().unwrap(), BackendKind::Opencode);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "cursor".parse::<BackendKind>().unwrap_err();
        assert_eq!(err, CoreError::UnknownBackend("cursor".to_string()));
    }

    #[test]
    fn test_display_matches_parse() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
