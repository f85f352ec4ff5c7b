//! Runner configuration.
//!
//! Values come from `~/.config/outpost/config.toml`, then `OUTPOST_*`
//! environment variables, then command-line flags, each layer overriding
//! the previous one. [`ConfigFile::resolve`] validates the merged result
//! into a [`RunnerConfig`].

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::connection::{ConnectError, ConnectionSettings, RunnerIdentity, normalize_url};
use crate::executor::ExecutorLimits;
use crate::validator::{Capabilities, EXEC_READONLY};

pub const ENV_BACKEND_URLS: &str = "OUTPOST_BACKEND_URLS";
pub const ENV_RUNNER_ID: &str = "OUTPOST_RUNNER_ID";
pub const ENV_RUNNER_NAME: &str = "OUTPOST_RUNNER_NAME";
pub const ENV_SECRET: &str = "OUTPOST_SECRET";
pub const ENV_CAPABILITIES: &str = "OUTPOST_CAPABILITIES";
pub const ENV_HEARTBEAT_SECS: &str = "OUTPOST_HEARTBEAT_SECS";
pub const ENV_RECONNECT_BASE_MS: &str = "OUTPOST_RECONNECT_BASE_MS";
pub const ENV_RECONNECT_MAX_MS: &str = "OUTPOST_RECONNECT_MAX_MS";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("no backend URL configured (runner.backends, OUTPOST_BACKEND_URLS or --backend)")]
    NoBackends,

    #[error("runner identity missing: set runner_id or runner_name")]
    MissingIdentity,

    #[error("runner secret is empty")]
    MissingSecret,

    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeat,

    #[error("reconnect delays must satisfy 0 < base ({base_ms} ms) <= max ({max_ms} ms)")]
    InvalidReconnect { base_ms: u64, max_ms: u64 },

    #[error("invalid backend: {0}")]
    Backend(#[from] ConnectError),
}

/// On-disk configuration (`config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub connection: ConnectionSection,
    pub executor: ExecutorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Backend base URLs (http, https, ws or wss).
    pub backends: Vec<String>,
    pub runner_id: Option<u64>,
    pub runner_name: Option<String>,
    pub secret: Option<String>,
    pub capabilities: Vec<String>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            runner_id: None,
            runner_name: None,
            secret: None,
            capabilities: vec![EXEC_READONLY.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub heartbeat_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Shell used as `<shell> -c <command>`.
    pub shell: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

/// Values given on the command line. `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backends: Vec<String>,
    pub runner_id: Option<u64>,
    pub runner_name: Option<String>,
    pub secret: Option<String>,
    pub capabilities: Vec<String>,
    pub heartbeat_secs: Option<u64>,
}

/// Validated configuration handed to the daemon.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Backend URLs as configured (normalized later, per connection).
    pub backends: Vec<String>,
    pub identity: RunnerIdentity,
    pub settings: ConnectionSettings,
}

/// `$XDG_CONFIG_HOME/outpost`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("outpost"))
}

impl ConfigFile {
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load `path`, or the default path when `None`.
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => {
                    debug!("No config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !explicit && !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply `OUTPOST_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `OUTPOST_*` variables using `lookup`. Blank values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(urls) = get(ENV_BACKEND_URLS) {
            self.runner.backends = split_list(&urls);
        }
        if let Some(id) = get(ENV_RUNNER_ID) {
            self.runner.runner_id = Some(parse_number(ENV_RUNNER_ID, &id)?);
        }
        if let Some(name) = get(ENV_RUNNER_NAME) {
            self.runner.runner_name = Some(name.trim().to_string());
        }
        if let Some(secret) = get(ENV_SECRET) {
            self.runner.secret = Some(secret);
        }
        if let Some(caps) = get(ENV_CAPABILITIES) {
            self.runner.capabilities = split_list(&caps);
        }
        if let Some(secs) = get(ENV_HEARTBEAT_SECS) {
            self.connection.heartbeat_secs = parse_number(ENV_HEARTBEAT_SECS, &secs)?;
        }
        if let Some(ms) = get(ENV_RECONNECT_BASE_MS) {
            self.connection.reconnect_base_ms = parse_number(ENV_RECONNECT_BASE_MS, &ms)?;
        }
        if let Some(ms) = get(ENV_RECONNECT_MAX_MS) {
            self.connection.reconnect_max_ms = parse_number(ENV_RECONNECT_MAX_MS, &ms)?;
        }
        Ok(())
    }

    /// Apply command-line values.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if !overrides.backends.is_empty() {
            self.runner.backends = overrides.backends;
        }
        if overrides.runner_id.is_some() {
            self.runner.runner_id = overrides.runner_id;
        }
        if overrides.runner_name.is_some() {
            self.runner.runner_name = overrides.runner_name;
        }
        if overrides.secret.is_some() {
            self.runner.secret = overrides.secret;
        }
        if !overrides.capabilities.is_empty() {
            self.runner.capabilities = overrides.capabilities;
        }
        if let Some(secs) = overrides.heartbeat_secs {
            self.connection.heartbeat_secs = secs;
        }
    }

    /// Validate and convert into runtime configuration.
    pub fn resolve(&self) -> Result<RunnerConfig, ConfigError> {
        let backends: Vec<String> = self
            .runner
            .backends
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        for backend in &backends {
            normalize_url(backend)?;
        }

        let runner_name = self
            .runner
            .runner_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if self.runner.runner_id.is_none() && runner_name.is_none() {
            return Err(ConfigError::MissingIdentity);
        }

        let secret = match self.runner.secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => return Err(ConfigError::MissingSecret),
        };

        let conn = &self.connection;
        if conn.heartbeat_secs == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if conn.reconnect_base_ms == 0 || conn.reconnect_base_ms > conn.reconnect_max_ms {
            return Err(ConfigError::InvalidReconnect {
                base_ms: conn.reconnect_base_ms,
                max_ms: conn.reconnect_max_ms,
            });
        }

        let shell = match self.executor.shell.trim() {
            "" => ExecutorSection::default().shell,
            shell => shell.to_string(),
        };

        Ok(RunnerConfig {
            backends,
            identity: RunnerIdentity {
                runner_id: self.runner.runner_id,
                runner_name,
                secret,
                capabilities: Capabilities::new(self.runner.capabilities.iter().cloned()),
            },
            settings: ConnectionSettings {
                heartbeat_interval: Duration::from_secs(conn.heartbeat_secs),
                reconnect_base: Duration::from_millis(conn.reconnect_base_ms),
                reconnect_max: Duration::from_millis(conn.reconnect_max_ms),
                executor: ExecutorLimits {
                    shell,
                    ..ExecutorLimits::default()
                },
            },
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// `$XDG_CONFIG_HOME/outpost/env`.
pub fn default_env_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("env"))
}

/// Parse `KEY=VALUE` lines. `#` starts a comment line; quotes are literal.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Load `path` into the process environment. Returns how many variables were set.
///
/// Must run before any other thread is started.
pub fn load_env_file(path: &Path) -> Result<usize, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let vars = parse_env_file(&contents);
    for (key, value) in &vars {
        // SAFETY: called from main before the tokio runtime or any other
        // thread exists, so nothing can read the environment concurrently.
        unsafe { std::env::set_var(key, value) };
    }
    info!("Loaded {} environment variables from {:?}", vars.len(), path);
    Ok(vars.len())
}
