//! Protocol decoding errors.

use thiserror::Error;

use crate::job::JobId;

/// Errors produced while decoding an inbound backend message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame has no string `type` field.
    #[error("message has no 'type' field")]
    MissingType,

    /// The `type` is not one this runner understands.
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// A known message type with missing or mistyped fields.
    #[error("invalid {message_type} message: {reason}")]
    Invalid {
        message_type: String,
        job_id: Option<JobId>,
        reason: String,
    },

    /// The `job_id` field is present but blank.
    #[error("{message_type} message has an empty job_id")]
    EmptyJobId { message_type: String },
}

impl ProtocolError {
    /// Job id recovered from a malformed message, if one could be read.
    ///
    /// Lets the runner still answer a broken `exec_request` with an
    /// `exec_error` instead of leaving the job without a terminal message.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Invalid { job_id, .. } => job_id.as_ref(),
            _ => None,
        }
    }

    /// Message type the error relates to, when known.
    pub fn message_type(&self) -> Option<&str> {
        match self {
            Self::UnknownType(t) => Some(t),
            Self::Invalid { message_type, .. } | Self::EmptyJobId { message_type } => {
                Some(message_type)
            }
            _ => None,
        }
    }
}
