//! The event bus: a Unix-socket back-channel for grandchild processes
//!
//! The chat sub-agent's coordinator tool spawns its own sub-agents; their
//! tool events must reach the end-user's stream without a direct pipe to
//! the parent. The bus is that channel: the parent binds a socket, every
//! child that needs it connects and writes newline-delimited JSON records
//! `{event, data}`, and the single registered listener receives each
//! record in arrival order. Malformed lines are dropped.

use crate::error::{AgentError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use uuid::Uuid;

/// One record on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub event: String,
    pub data: Value,
}

type BusHandler = Box<dyn Fn(BusEnvelope) + Send + Sync + 'static>;

/// Parent-owned socket server
pub struct EventBus {
    path: PathBuf,
    handler: Arc<Mutex<Option<BusHandler>>>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl EventBus {
    /// Bind a fresh socket under the system temp directory.
    pub fn bind() -> Result<EventBus> {
        let path = std::env::temp_dir().join(format!("willow-evt-{}.sock", Uuid::new_v4().simple()));
        EventBus::bind_at(path)
    }

    /// Bind at an explicit path, replacing any stale socket file.
    pub fn bind_at(path: PathBuf) -> Result<EventBus> {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener =
            UnixListener::bind(&path).map_err(|e| AgentError::Bus(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Event bus listening");

        let handler: Arc<Mutex<Option<BusHandler>>> = Arc::new(Mutex::new(None));
        let accept_handler = handler.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let handler = accept_handler.clone();
                        tokio::spawn(handle_connection(stream, handler));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Bus accept failed");
                    }
                }
            }
        });

        Ok(EventBus {
            path,
            handler,
            accept_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register the listener; a second registration replaces the first.
    pub fn on_event(&self, f: impl Fn(BusEnvelope) + Send + Sync + 'static) {
        *self.handler.lock() = Some(Box::new(f));
    }

    /// Stop accepting and remove the socket file.
    pub fn close(&self) {
        self.accept_task.abort();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Socket cleanup failed");
            }
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.close();
    }
}

async fn handle_connection(stream: UnixStream, handler: Arc<Mutex<Option<BusHandler>>>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match serde_json::from_str::<BusEnvelope>(&line) {
            Ok(envelope) => {
                if let Some(handler) = handler.lock().as_ref() {
                    handler(envelope);
                }
            }
            Err(_) => {
                tracing::trace!("Dropped malformed bus line");
            }
        }
    }
}

/// Client side: connect once and push records as they happen.
pub struct BusClient {
    stream: UnixStream,
}

impl BusClient {
    pub async fn connect(path: &Path) -> Result<BusClient> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| AgentError::Bus(e.to_string()))?;
        Ok(BusClient { stream })
    }

    pub async fn send(&mut self, envelope: &BusEnvelope) -> Result<()> {
        let mut line = serde_json::to_string(envelope)?;
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Bus(e.to_string()))
    }
}
