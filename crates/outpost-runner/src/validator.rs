//! Command policy for incoming exec requests.
//!
//! All validation is pure (no side effects). A runner holding `exec.full`
//! may run anything; otherwise only simple read-only invocations from a
//! fixed allowlist pass. This reduces risk for simple commands; it does not
//! parse shell quoting and is not a sandbox.

use std::collections::HashSet;
use thiserror::Error;

/// Capability that allows any command.
pub const EXEC_FULL: &str = "exec.full";

/// Capability that allows allowlisted read-only commands.
pub const EXEC_READONLY: &str = "exec.readonly";

/// Extra capability required for read-only docker commands.
pub const DOCKER: &str = "docker";

/// Characters that enable chaining, substitution, redirection or piping.
pub const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '>', '<', '$', '(', ')', '`', '\n', '\\'];

/// Commands that alter processes, users, filesystems or the network.
///
/// Checked before the allowlist; a blocked command is never allowed.
pub const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "mv", "cp", "dd", "ln", "truncate", "shred", "mkfs", "fdisk", "parted",
    "mount", "umount", "chmod", "chown", "chgrp", "kill", "killall", "pkill", "shutdown",
    "reboot", "halt", "poweroff", "init", "useradd", "userdel", "usermod", "groupadd",
    "groupdel", "passwd", "sudo", "su", "doas", "crontab", "iptables", "ip6tables", "nft",
    "ufw", "curl", "wget", "nc", "ncat", "ssh", "scp", "rsync", "tee", "sh", "bash", "zsh",
    "env", "xargs",
];

/// Read-only introspection commands.
///
/// `systemctl`, `journalctl` and `docker` get additional per-command checks.
pub const READONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "wc", "stat", "file", "which", "pwd", "echo",
    "whoami", "id", "uname", "uptime", "w", "who", "ps", "free", "df", "du", "lsblk", "lscpu",
    "nproc", "vmstat", "ss", "netstat", "systemctl", "journalctl", "docker",
];

/// Docker subcommands that only read state.
pub const DOCKER_READONLY_SUBCOMMANDS: &[&str] =
    &["ps", "logs", "stats", "inspect", "images", "info", "version"];

/// Capability strings granted to a runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(HashSet<String>);

impl Capabilities {
    pub fn new<I, S>(caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            caps.into_iter()
                .map(Into::into)
                .map(|c: String| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    pub fn has(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted capability names (stable for logging).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Why a command was refused. The `Display` text is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandDenied {
    #[error("empty command")]
    Empty,

    #[error("runner has neither 'exec.full' nor 'exec.readonly' capability")]
    NoExecCapability,

    #[error("command contains shell metacharacter {0:?}; chaining, pipes, redirection and substitution are not allowed")]
    Metacharacter(char),

    #[error("command '{0}' is blocked")]
    Blocked(String),

    #[error("command '{0}' is not in the read-only allowlist")]
    NotAllowlisted(String),

    #[error("'{command}' subcommand '{subcommand}' is not allowed in read-only mode")]
    Subcommand { command: String, subcommand: String },

    #[error("journalctl requires --no-pager")]
    PagerNotDisabled,

    #[error("'{command}' requires the '{capability}' capability")]
    MissingCapability {
        command: String,
        capability: &'static str,
    },
}

/// Outcome of validating a command, in plain form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl From<Result<(), CommandDenied>> for ValidationResult {
    fn from(result: Result<(), CommandDenied>) -> Self {
        match result {
            Ok(()) => Self {
                allowed: true,
                reason: None,
            },
            Err(denied) => Self {
                allowed: false,
                reason: Some(denied.to_string()),
            },
        }
    }
}

/// Convenience wrapper returning [`ValidationResult`].
pub fn validate(command: &str, caps: &Capabilities) -> ValidationResult {
    validate_command(command, caps).into()
}

/// Decide whether `command` may run under `caps`.
///
/// Rules, in order:
/// - Empty (after trim) is always rejected
/// - `exec.full` allows anything
/// - Without `exec.readonly` nothing else is allowed
/// - Shell metacharacters are rejected
/// - The base command (path prefix stripped) must not be blocklisted
/// - The base command must be allowlisted
/// - `systemctl` only with `status`, `journalctl` only with `--no-pager`,
///   `docker` only with the `docker` capability and a read-only subcommand
pub fn validate_command(command: &str, caps: &Capabilities) -> Result<(), CommandDenied> {
    let command = command.trim();
    if command.is_empty() {
        return Err(CommandDenied::Empty);
    }

    if caps.has(EXEC_FULL) {
        return Ok(());
    }
    if !caps.has(EXEC_READONLY) {
        return Err(CommandDenied::NoExecCapability);
    }

    if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(CommandDenied::Metacharacter(c));
    }

    let mut tokens = command.split_whitespace();
    let base = tokens.next().map(base_command).unwrap_or_default();
    let subcommand = tokens.next();

    if BLOCKED_COMMANDS.contains(&base) {
        return Err(CommandDenied::Blocked(base.to_string()));
    }
    if !READONLY_COMMANDS.contains(&base) {
        return Err(CommandDenied::NotAllowlisted(base.to_string()));
    }

    match base {
        "systemctl" => {
            if subcommand != Some("status") {
                return Err(CommandDenied::Subcommand {
                    command: base.to_string(),
                    subcommand: subcommand.unwrap_or_default().to_string(),
                });
            }
        }
        "journalctl" => {
            if !command.contains("--no-pager") {
                return Err(CommandDenied::PagerNotDisabled);
            }
        }
        "docker" => {
            if !caps.has(DOCKER) {
                return Err(CommandDenied::MissingCapability {
                    command: base.to_string(),
                    capability: DOCKER,
                });
            }
            let sub = subcommand.unwrap_or_default();
            if !DOCKER_READONLY_SUBCOMMANDS.contains(&sub) {
                return Err(CommandDenied::Subcommand {
                    command: base.to_string(),
                    subcommand: sub.to_string(),
                });
            }
        }
        _ => {}
    }

    Ok(())
}

/// Last path segment of the first token (`/usr/bin/docker` -> `docker`).
pub fn base_command(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}
