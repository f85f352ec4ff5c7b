//! Host probe for the hello payload.

use outpost_protocol::HostMetadata;
use std::path::Path;

/// Docker daemon socket checked for `docker_available`.
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Collect host facts once at startup.
pub fn probe_host_metadata() -> HostMetadata {
    HostMetadata {
        hostname: hostname(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docker_available: Path::new(DOCKER_SOCKET).exists(),
    }
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}
