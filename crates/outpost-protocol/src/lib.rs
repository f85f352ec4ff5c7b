//! Wire protocol types for outpost runner communication.
//!
//! A runner keeps one persistent WebSocket connection per backend and
//! exchanges newline-free JSON text frames, each tagged with a `type` field:
//!
//! ```text
//! Backend --[exec_request / exec_cancel]--> Runner
//! Backend <--[hello / heartbeat / exec_chunk / exec_done / exec_error]-- Runner
//! ```
//!
//! Every `exec_request` is answered by exactly one terminal message
//! (`exec_done` or `exec_error`) for its job id, preceded by zero or more
//! `exec_chunk` messages.

pub mod error;
pub mod job;
pub mod messages;
pub mod metadata;

pub use error::ProtocolError;
pub use job::{JobId, OutputStream};
pub use messages::{
    BackendToRunner, ExecCancel, ExecChunk, ExecDone, ExecError, ExecRequest, RunnerHello,
    RunnerToBackend,
};
pub use metadata::HostMetadata;
