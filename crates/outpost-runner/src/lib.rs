//! Outbound-only runner daemon.
//!
//! The runner dials one or more backends over WebSocket, authenticates with
//! a shared secret, and executes policy-checked shell commands on their
//! behalf, streaming output back as it is produced.

pub mod config;
pub mod connection;
pub mod daemon;
pub mod executor;
pub mod metadata;
pub mod validator;

pub use config::{ConfigError, ConfigFile, Overrides, RunnerConfig};
pub use connection::{
    ConnectError, ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionState,
    RunnerIdentity,
};
pub use daemon::RunnerDaemon;
pub use executor::{CommandExecutor, ExecutorLimits, JobEvent, JobEventKind};
pub use metadata::probe_host_metadata;
pub use validator::{Capabilities, CommandDenied, ValidationResult, validate, validate_command};
