//! Test utilities: a local WebSocket backend the runner can dial.
#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use outpost_protocol::HostMetadata;
use outpost_runner::{Capabilities, ConnectionSettings, ExecutorLimits, RunnerIdentity};

pub const WAIT: Duration = Duration::from_secs(10);

/// Backend that accepts runner connections on 127.0.0.1.
pub struct MockBackend {
    /// Base URL to configure the runner with (`http://127.0.0.1:<port>`).
    pub url: String,
    connections: mpsc::UnboundedReceiver<BackendConn>,
    accept_task: JoinHandle<()>,
}

/// One accepted runner connection.
pub struct BackendConn {
    /// Request path used by the runner.
    pub path: String,
    ws: WebSocketStream<TcpStream>,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().expect("socket addr")).await
    }

    /// Start listening on a specific address, e.g. one the runner is already dialing.
    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut path = String::new();
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().path().to_string();
                    Ok(resp)
                };
                match tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    Ok(ws) => {
                        if tx.send(BackendConn { path, ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("mock backend handshake failed: {e}"),
                }
            }
        });

        Self {
            url: format!("http://{addr}"),
            connections,
            accept_task,
        }
    }

    /// Wait for the runner to connect.
    pub async fn next_connection(&mut self) -> BackendConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for runner to connect")
            .expect("mock backend stopped")
    }

    /// Stop accepting new connections.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl BackendConn {
    /// Next JSON message, or `None` if the runner closed the connection.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for runner message");
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).expect("runner sent invalid JSON"));
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next message that is not a heartbeat.
    pub async fn recv_non_heartbeat(&mut self) -> Value {
        loop {
            let msg = self.recv().await.expect("runner closed the connection");
            if msg["type"] != "heartbeat" {
                return msg;
            }
        }
    }

    /// Expect the runner's hello and return it.
    pub async fn expect_hello(&mut self) -> Value {
        let hello = self.recv_non_heartbeat().await;
        assert_eq!(hello["type"], "hello", "first message must be hello: {hello}");
        hello
    }

    /// Collect every message for `job_id` up to and including its terminal one.
    pub async fn collect_job(&mut self, job_id: &Value) -> Vec<Value> {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv_non_heartbeat().await;
            if &msg["job_id"] != job_id {
                continue;
            }
            let terminal = msg["type"] == "exec_done" || msg["type"] == "exec_error";
            messages.push(msg);
            if terminal {
                return messages;
            }
        }
    }

    pub async fn send(&mut self, message: Value) {
        self.ws
            .send(Message::Text(message.to_string().into()))
            .await
            .expect("send to runner");
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("send to runner");
    }

    /// Drop the connection without a close handshake.
    pub fn drop_connection(self) {
        drop(self.ws);
    }
}

pub fn identity(caps: &[&str]) -> Arc<RunnerIdentity> {
    Arc::new(RunnerIdentity {
        runner_id: None,
        runner_name: Some("test-runner".to_string()),
        secret: "test-secret".to_string(),
        capabilities: Capabilities::new(caps.iter().copied()),
    })
}

pub fn metadata() -> Arc<HostMetadata> {
    Arc::new(HostMetadata {
        hostname: "test-host".to_string(),
        platform: "linux".to_string(),
        arch: "x86_64".to_string(),
        version: "0.0.0-test".to_string(),
        docker_available: false,
    })
}

/// Fast timings so tests do not wait on production defaults.
pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        heartbeat_interval: Duration::from_secs(3600),
        reconnect_base: Duration::from_millis(50),
        reconnect_max: Duration::from_millis(400),
        executor: ExecutorLimits {
            kill_grace: Duration::from_millis(300),
            drain_grace: Duration::from_millis(500),
            ..ExecutorLimits::default()
        },
    }
}
