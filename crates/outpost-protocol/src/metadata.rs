//! Host facts embedded in the runner hello.

use serde::{Deserialize, Serialize};

/// Snapshot of the host the runner is executing on.
///
/// Collected once at startup and sent unchanged with every hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMetadata {
    pub hostname: String,
    /// Operating system (e.g. "linux", "macos").
    pub platform: String,
    /// CPU architecture (e.g. "x86_64", "aarch64").
    pub arch: String,
    /// Runner version.
    pub version: String,
    /// Whether a Docker socket is reachable on this host.
    pub docker_available: bool,
}
