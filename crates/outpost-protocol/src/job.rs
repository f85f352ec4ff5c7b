//! Job identifiers and output stream names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque job identifier chosen by the backend.
///
/// Backends may send either a JSON string or any JSON number; the runner
/// echoes the id back in the same representation it was received in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(serde_json::Number),
    Text(String),
}

impl JobId {
    /// Whether the id carries no usable value (blank string).
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(text) => text.trim().is_empty(),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Which pipe of the child process a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}
