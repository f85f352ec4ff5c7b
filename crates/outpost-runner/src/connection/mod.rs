//! Persistent session with one backend.
//!
//! A [`ConnectionManager`] dials the backend's agent endpoint, registers
//! with a `hello`, sends heartbeats, dispatches inbound requests to the
//! validator and its own [`CommandExecutor`], and forwards job events
//! upstream. When the transport drops it reconnects with exponential
//! backoff until [`ConnectionHandle::stop`] is called.
//!
//! The manager runs as a single task, so a session never has more than
//! one transport or one pending reconnect.

pub mod backoff;

pub use backoff::Backoff;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use outpost_protocol::{
    BackendToRunner, ExecRequest, HostMetadata, ProtocolError, RunnerHello, RunnerToBackend,
};

use crate::executor::{CommandExecutor, ExecutorLimits, JobEventReceiver};
use crate::validator::{Capabilities, validate_command};

/// Path of the agent endpoint on every backend.
pub const AGENT_PATH: &str = "/ws/agent";

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Upper bound on a single dial attempt (TCP + TLS + upgrade).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Errors from the connection layer.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid backend URL '{0}'")]
    InvalidUrl(String),

    #[error("unsupported scheme '{scheme}' in backend URL '{url}' (expected http, https, ws or wss)")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Turn a configured backend URL into its agent WebSocket URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; trailing slashes are
/// dropped before [`AGENT_PATH`] is appended.
pub fn normalize_url(url: &str) -> Result<String, ConnectError> {
    let trimmed = url.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| ConnectError::InvalidUrl(trimmed.to_string()))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectError::UnsupportedScheme {
                scheme: other.to_string(),
                url: trimmed.to_string(),
            });
        }
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(ConnectError::InvalidUrl(trimmed.to_string()));
    }

    Ok(format!("{scheme}://{rest}{AGENT_PATH}"))
}

/// Who this runner is. Created once at startup and never mutated.
#[derive(Clone)]
pub struct RunnerIdentity {
    pub runner_id: Option<u64>,
    pub runner_name: Option<String>,
    pub secret: String,
    pub capabilities: Capabilities,
}

impl RunnerIdentity {
    pub fn hello(&self, metadata: &HostMetadata) -> RunnerToBackend {
        RunnerToBackend::Hello(RunnerHello {
            runner_id: self.runner_id,
            runner_name: self.runner_name.clone(),
            secret: self.secret.clone(),
            metadata: metadata.clone(),
        })
    }

    /// Human-readable name for logs.
    pub fn label(&self) -> String {
        match (&self.runner_name, self.runner_id) {
            (Some(name), Some(id)) => format!("{name} (#{id})"),
            (Some(name), None) => name.clone(),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

impl fmt::Debug for RunnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerIdentity")
            .field("runner_id", &self.runner_id)
            .field("runner_name", &self.runner_name)
            .field("secret", &"<redacted>")
            .field("capabilities", &self.capabilities.names())
            .finish()
    }
}

/// Timing and executor settings for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub executor: ExecutorLimits,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            executor: ExecutorLimits::default(),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal; reached only through [`ConnectionHandle::stop`].
    Stopped,
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Session with one backend. Consumed by [`ConnectionManager::spawn`].
pub struct ConnectionManager {
    url: String,
    identity: Arc<RunnerIdentity>,
    metadata: Arc<HostMetadata>,
    settings: ConnectionSettings,
    executor: CommandExecutor,
    events: JobEventReceiver,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        endpoint: &str,
        identity: Arc<RunnerIdentity>,
        metadata: Arc<HostMetadata>,
        settings: ConnectionSettings,
    ) -> Result<Self, ConnectError> {
        let url = normalize_url(endpoint)?;
        let (executor, events) = CommandExecutor::channel(settings.executor.clone());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            url,
            identity,
            metadata,
            settings,
            executor,
            events,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Normalized agent URL this manager dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start the connect loop on the runtime.
    pub fn spawn(self) -> ConnectionHandle {
        let handle_url = self.url.clone();
        let shutdown = self.shutdown.clone();
        let state = self.state.subscribe();
        let executor = self.executor.clone();
        let task = tokio::spawn(self.run());

        ConnectionHandle {
            url: handle_url,
            shutdown,
            state,
            executor,
            task,
        }
    }

    async fn run(mut self) {
        let mut backoff = Backoff::new(self.settings.reconnect_base, self.settings.reconnect_max);

        while !self.shutdown.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            debug!("Connecting to {}", self.url);

            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str())) => result,
            };

            match attempt {
                Ok(Ok((ws, _response))) => {
                    info!("Connected to {}", self.url);
                    match self.session(ws, &mut backoff).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            warn!("Connection to {} lost: {}", self.url, reason)
                        }
                    }
                }
                Ok(Err(e)) => warn!("Failed to connect to {}: {}", self.url, e),
                Err(_) => warn!(
                    "Failed to connect to {}: {}",
                    self.url,
                    ConnectError::Timeout(CONNECT_TIMEOUT)
                ),
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            info!("Reconnecting to {} in {:?}", self.url, delay);
            if !self.wait_before_reconnect(delay).await {
                break;
            }
        }

        self.executor.terminate_all();
        self.set_state(ConnectionState::Stopped);
        info!("Connection to {} stopped", self.url);
    }

    /// Drive one connected transport until it drops or shutdown is requested.
    async fn session(&mut self, ws: WsStream, backoff: &mut Backoff) -> SessionEnd {
        let (mut writer, mut reader) = ws.split();

        self.discard_pending_events();

        if let Err(e) = send(&mut writer, &self.identity.hello(&self.metadata)).await {
            return SessionEnd::Lost(format!("failed to send hello: {e}"));
        }
        backoff.reset();
        self.set_state(ConnectionState::Connected);
        info!(
            "Registered with {} as {}",
            self.url,
            self.identity.label()
        );

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "runner shutting down".into(),
                    };
                    if let Err(e) = writer.send(Message::Close(Some(frame))).await {
                        debug!("Failed to send close frame to {}: {}", self.url, e);
                    }
                    return SessionEnd::Shutdown;
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = send(&mut writer, &RunnerToBackend::Heartbeat).await {
                        return SessionEnd::Lost(format!("heartbeat failed: {e}"));
                    }
                }

                Some(event) = self.events.recv() => {
                    let message = RunnerToBackend::from(event);
                    if let Err(e) = send(&mut writer, &message).await {
                        return SessionEnd::Lost(format!("failed to send {}: {e}", message.kind()));
                    }
                }

                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.dispatch(text.as_str()) {
                            if let Err(e) = send(&mut writer, &reply).await {
                                return SessionEnd::Lost(format!("failed to send {}: {e}", reply.kind()));
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by backend ({} {})", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "closed by backend".to_string());
                        return SessionEnd::Lost(reason);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame from {}", self.url);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                },
            }
        }
    }

    /// Handle one inbound text frame. Returns an immediate reply, if any.
    fn dispatch(&self, text: &str) -> Option<RunnerToBackend> {
        match BackendToRunner::parse(text) {
            Ok(BackendToRunner::ExecRequest(request)) => self.handle_exec_request(request),
            Ok(BackendToRunner::ExecCancel(cancel)) => {
                if !self.executor.cancel(&cancel.job_id) {
                    info!(
                        "Cancel for job {} from {} matched no running job",
                        cancel.job_id, self.url
                    );
                }
                None
            }
            Err(ProtocolError::UnknownType(message_type)) => {
                info!(
                    "Ignoring unknown message type '{}' from {}",
                    message_type, self.url
                );
                None
            }
            Err(e) => {
                warn!("Dropping malformed message from {}: {}", self.url, e);
                match (e.message_type(), e.job_id()) {
                    (Some("exec_request"), Some(job_id)) => {
                        Some(RunnerToBackend::exec_error(job_id.clone(), e.to_string()))
                    }
                    _ => None,
                }
            }
        }
    }

    fn handle_exec_request(&self, request: ExecRequest) -> Option<RunnerToBackend> {
        match validate_command(&request.command, &self.identity.capabilities) {
            Ok(()) => {
                self.executor
                    .execute(request.job_id, &request.command, request.timeout_secs);
                None
            }
            Err(denied) => {
                warn!("Rejected job {}: {}", request.job_id, denied);
                Some(RunnerToBackend::exec_error(
                    request.job_id,
                    denied.to_string(),
                ))
            }
        }
    }

    /// Sleep for `delay`, dropping job events that cannot be delivered.
    ///
    /// Returns `false` if shutdown was requested.
    async fn wait_before_reconnect(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(event) = self.events.recv() => {
                    warn!(
                        "Not connected to {}; dropping {} for job {}",
                        self.url,
                        RunnerToBackend::from(event.clone()).kind(),
                        event.job_id
                    );
                }
            }
        }
    }

    /// Drop events produced while the dial was in progress.
    fn discard_pending_events(&mut self) {
        let mut dropped = 0usize;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(
                "Dropped {} job event(s) produced while disconnected from {}",
                dropped, self.url
            );
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("{}: {:?} -> {:?}", self.url, previous, state);
        }
    }
}

async fn send(writer: &mut WsWriter, message: &RunnerToBackend) -> Result<(), ConnectError> {
    let json = message.to_json()?;
    writer.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Owner's view of a running [`ConnectionManager`].
pub struct ConnectionHandle {
    url: String,
    shutdown: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    executor: CommandExecutor,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Jobs currently running for this backend.
    pub fn live_jobs(&self) -> usize {
        self.executor.live_jobs()
    }

    /// Close the transport, terminate live jobs and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Connection task for {} failed: {}", self.url, e);
        }
    }
}
