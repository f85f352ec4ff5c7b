//! Runner wire messages.
//!
//! Both directions use JSON objects tagged by a snake_case `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::job::{JobId, OutputStream};
use crate::metadata::HostMetadata;

// ============================================================================
// Runner -> backend
// ============================================================================

/// Runner hello (sent once, immediately after the connection opens).
///
/// At least one of `runner_id` / `runner_name` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerHello {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_name: Option<String>,
    pub secret: String,
    pub metadata: HostMetadata,
}

/// A fragment of job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecChunk {
    pub job_id: JobId,
    pub stream: OutputStream,
    pub data: String,
}

/// Job finished normally (any exit code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecDone {
    pub job_id: JobId,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Job was rejected, failed to start, or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecError {
    pub job_id: JobId,
    pub error: String,
}

/// Message from runner to backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerToBackend {
    /// Runner registration.
    Hello(RunnerHello),

    /// Periodic liveness signal.
    Heartbeat,

    /// Output fragment for a running job.
    ExecChunk(ExecChunk),

    /// Terminal: job exited.
    ExecDone(ExecDone),

    /// Terminal: job failed.
    ExecError(ExecError),
}

impl RunnerToBackend {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Job id this message belongs to, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::ExecChunk(m) => Some(&m.job_id),
            Self::ExecDone(m) => Some(&m.job_id),
            Self::ExecError(m) => Some(&m.job_id),
            Self::Hello(_) | Self::Heartbeat => None,
        }
    }

    /// Whether this message ends a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExecDone(_) | Self::ExecError(_))
    }

    /// Short name for logging (never includes payload data).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Heartbeat => "heartbeat",
            Self::ExecChunk(_) => "exec_chunk",
            Self::ExecDone(_) => "exec_done",
            Self::ExecError(_) => "exec_error",
        }
    }

    pub fn exec_error(job_id: JobId, error: impl Into<String>) -> Self {
        Self::ExecError(ExecError {
            job_id,
            error: error.into(),
        })
    }
}

// ============================================================================
// Backend -> runner
// ============================================================================

/// Request to run a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub job_id: JobId,
    pub command: String,
    /// Deadline in seconds; 0 means unbounded.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Request to stop a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCancel {
    pub job_id: JobId,
}

/// Message from backend to runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendToRunner {
    ExecRequest(ExecRequest),
    ExecCancel(ExecCancel),
}

impl BackendToRunner {
    /// Wire names of every message type this runner understands.
    pub const KNOWN_TYPES: &'static [&'static str] = &["exec_request", "exec_cancel"];

    /// Decode a text frame.
    ///
    /// Unknown `type` values are reported as [`ProtocolError::UnknownType`]
    /// so callers can ignore them without treating them as malformed.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !Self::KNOWN_TYPES.contains(&message_type.as_str()) {
            return Err(ProtocolError::UnknownType(message_type));
        }

        let job_id = value
            .get("job_id")
            .cloned()
            .and_then(|raw| serde_json::from_value::<JobId>(raw).ok());

        let message: Self = serde_json::from_value(value).map_err(|e| ProtocolError::Invalid {
            message_type: message_type.clone(),
            job_id,
            reason: e.to_string(),
        })?;

        if message.job_id().is_blank() {
            return Err(ProtocolError::EmptyJobId { message_type });
        }

        Ok(message)
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::ExecRequest(r) => &r.job_id,
            Self::ExecCancel(r) => &r.job_id,
        }
    }
}
