//! Multi-home daemon: one connection manager per backend.

use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use outpost_protocol::HostMetadata;

use crate::config::RunnerConfig;
use crate::connection::{ConnectError, ConnectionHandle, ConnectionManager, normalize_url};

/// Running daemon. Each backend has its own session, executor and backoff.
pub struct RunnerDaemon {
    connections: Vec<ConnectionHandle>,
}

impl RunnerDaemon {
    /// Start one connection per distinct backend.
    pub fn start(config: RunnerConfig, metadata: HostMetadata) -> Result<Self, ConnectError> {
        let endpoints = dedupe_endpoints(&config.backends)?;
        let identity = Arc::new(config.identity);
        let metadata = Arc::new(metadata);

        info!(
            "Starting runner {} with capabilities [{}] against {} backend(s)",
            identity.label(),
            identity.capabilities.names().join(", "),
            endpoints.len()
        );

        let mut connections = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let manager = ConnectionManager::new(
                endpoint,
                Arc::clone(&identity),
                Arc::clone(&metadata),
                config.settings.clone(),
            )?;
            connections.push(manager.spawn());
        }

        Ok(Self { connections })
    }

    pub fn connections(&self) -> &[ConnectionHandle] {
        &self.connections
    }

    /// Stop every connection concurrently.
    pub async fn stop(self) {
        info!("Stopping {} connection(s)", self.connections.len());
        futures::future::join_all(self.connections.into_iter().map(ConnectionHandle::stop)).await;
        info!("Runner stopped");
    }
}

/// Drop backends that normalize to an already listed URL, keeping order.
pub fn dedupe_endpoints(backends: &[String]) -> Result<Vec<String>, ConnectError> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(backends.len());
    for backend in backends {
        let normalized = normalize_url(backend)?;
        if seen.insert(normalized) {
            endpoints.push(backend.clone());
        } else {
            warn!("Ignoring duplicate backend {}", backend);
        }
    }
    Ok(endpoints)
}
