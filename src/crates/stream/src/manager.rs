//! The stream manager: one broadcast context per conversation
//!
//! An [`ActiveStream`] buffers every event of an in-flight generation so a
//! client can join (or rejoin) at any moment and see the identical event
//! sequence: replay of the buffer, then live events, no duplicates, no
//! gaps. Replay and subscriber registration happen under the same lock as
//! event ingestion, which is what makes that guarantee hold.

use crate::emitter::EventEmitter;
use crate::error::{Result, StreamError};
use crate::event::{strip_tool_call_xml, PhaseMark, StreamEvent, ToolPhase};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long a finished stream stays registered so late clients can replay
pub const LINGER_AFTER_DONE: Duration = Duration::from_secs(60);

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Streaming,
    Complete,
    Error,
}

/// One tool call observed on a stream, tagged with the phase that was
/// active when it started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub phase: ToolPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Value>,
}

/// Persistence seam used at finalize time. The implementation stores the
/// assistant message and conversation metadata and may return a title to
/// announce (derived from the first user message when the conversation has
/// none yet).
#[async_trait::async_trait]
pub trait StreamSink: Send + Sync {
    async fn persist_turn(
        &self,
        conversation_id: &str,
        content: &str,
        tool_calls: &[ToolCallRecord],
    ) -> Result<Option<String>>;
}

/// A sink that stores nothing; useful in tests and tools
pub struct NullSink;

#[async_trait::async_trait]
impl StreamSink for NullSink {
    async fn persist_turn(
        &self,
        _conversation_id: &str,
        _content: &str,
        _tool_calls: &[ToolCallRecord],
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

struct StreamState {
    buffer: Vec<StreamEvent>,
    status: StreamStatus,
    full_content: String,
    tool_calls: Vec<ToolCallRecord>,
    current_phase: ToolPhase,
    subscribers: Vec<mpsc::UnboundedSender<StreamEvent>>,
}

/// The per-conversation broadcast context
pub struct ActiveStream {
    pub conversation_id: String,
    state: Mutex<StreamState>,
    done: Notify,
}

impl ActiveStream {
    fn new(conversation_id: String) -> ActiveStream {
        ActiveStream {
            conversation_id,
            state: Mutex::new(StreamState {
                buffer: Vec::new(),
                status: StreamStatus::Streaming,
                full_content: String::new(),
                tool_calls: Vec::new(),
                current_phase: ToolPhase::Chat,
                subscribers: Vec::new(),
            }),
            done: Notify::new(),
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.state.lock().status
    }

    /// Accumulated assistant text so far (tool-call XML not yet stripped)
    pub fn full_content(&self) -> String {
        self.state.lock().full_content.clone()
    }

    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.state.lock().tool_calls.clone()
    }

    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Wait until the stream leaves the `streaming` state.
    pub async fn wait_done(&self) {
        loop {
            let notified = self.done.notified();
            if self.state.lock().status != StreamStatus::Streaming {
                return;
            }
            notified.await;
        }
    }

    /// Append an event: update derived state, buffer it, fan out.
    fn ingest(&self, event: StreamEvent) {
        let mut state = self.state.lock();
        match &event {
            StreamEvent::Content { text } => state.full_content.push_str(text),
            StreamEvent::SearchPhase { status } => {
                state.current_phase = match status {
                    PhaseMark::Start => ToolPhase::Search,
                    PhaseMark::End => ToolPhase::Chat,
                };
            }
            StreamEvent::IndexerPhase { status } => {
                state.current_phase = match status {
                    PhaseMark::Start => ToolPhase::Indexer,
                    PhaseMark::End => ToolPhase::Chat,
                };
            }
            StreamEvent::ToolCallStart { id, name } => {
                let phase = state.current_phase;
                state.tool_calls.push(ToolCallRecord {
                    id: id.clone(),
                    name: name.clone(),
                    phase,
                    args: None,
                    results: Vec::new(),
                });
            }
            StreamEvent::ToolCallArgs { id, args } => {
                if let Some(call) = state.tool_calls.iter_mut().find(|c| &c.id == id) {
                    call.args = Some(args.clone());
                }
            }
            StreamEvent::ToolResult { id, result } => {
                if let Some(call) = state.tool_calls.iter_mut().find(|c| &c.id == id) {
                    call.results.push(result.clone());
                }
            }
            StreamEvent::Error { .. } => state.status = StreamStatus::Error,
            _ => {}
        }
        state.buffer.push(event.clone());
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn close(&self, status: StreamStatus) {
        let mut state = self.state.lock();
        if state.status != StreamStatus::Error {
            state.status = status;
        }
        state.subscribers.clear();
        drop(state);
        self.done.notify_waiters();
    }
}

/// A live attachment to a stream: the whole buffered prefix followed by
/// every later event, exactly once
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Registry of active streams, one per conversation at most
pub struct StreamManager {
    streams: Mutex<HashMap<String, Arc<ActiveStream>>>,
    sink: Arc<dyn StreamSink>,
    linger: Duration,
}

impl StreamManager {
    pub fn new(sink: Arc<dyn StreamSink>) -> Arc<StreamManager> {
        StreamManager::with_linger(sink, LINGER_AFTER_DONE)
    }

    /// Registry with a custom linger window (tests shorten it)
    pub fn with_linger(sink: Arc<dyn StreamSink>, linger: Duration) -> Arc<StreamManager> {
        Arc::new(StreamManager {
            streams: Mutex::new(HashMap::new()),
            sink,
            linger,
        })
    }

    /// Start consuming a turn's events. Idempotent: when the conversation
    /// already has a streaming ActiveStream, that stream is returned
    /// unchanged and `source` is dropped.
    pub fn start_stream(
        self: &Arc<Self>,
        conversation_id: &str,
        source: impl Stream<Item = StreamEvent> + Send + 'static,
    ) -> Arc<ActiveStream> {
        let mut streams = self.streams.lock();
        if let Some(existing) = streams.get(conversation_id) {
            if existing.status() == StreamStatus::Streaming {
                tracing::debug!(conversation = conversation_id, "Stream already active");
                return existing.clone();
            }
        }

        let stream = Arc::new(ActiveStream::new(conversation_id.to_string()));
        streams.insert(conversation_id.to_string(), stream.clone());
        drop(streams);

        let manager = self.clone();
        let active = stream.clone();
        tokio::spawn(async move {
            manager.consume(active, source).await;
        });
        stream
    }

    /// Convenience: create an emitter whose events drive a new stream.
    pub fn open_emitter(self: &Arc<Self>, conversation_id: &str) -> (EventEmitter, Arc<ActiveStream>) {
        let (emitter, rx) = EventEmitter::channel();
        let stream = self.start_stream(conversation_id, UnboundedReceiverStream::new(rx));
        (emitter, stream)
    }

    pub fn get(&self, conversation_id: &str) -> Option<Arc<ActiveStream>> {
        self.streams.lock().get(conversation_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Attach to a stream: synchronously replay the buffered log, then
    /// receive live events while the stream lasts. Returns an error when
    /// the conversation has no registered stream.
    pub fn subscribe(&self, conversation_id: &str) -> Result<Subscription> {
        let stream = self
            .get(conversation_id)
            .ok_or_else(|| StreamError::NoActiveStream(conversation_id.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = stream.state.lock();
        for event in &state.buffer {
            let _ = tx.send(event.clone());
        }
        if state.status == StreamStatus::Streaming {
            state.subscribers.push(tx);
        }
        // For finished streams the replayed buffer already ends in `done`.
        Ok(Subscription { rx })
    }

    async fn consume(
        self: Arc<Self>,
        stream: Arc<ActiveStream>,
        source: impl Stream<Item = StreamEvent> + Send + 'static,
    ) {
        futures::pin_mut!(source);
        let mut clean_end = false;
        while let Some(event) = source.next().await {
            match event {
                StreamEvent::Done => {
                    clean_end = true;
                    break;
                }
                other => stream.ingest(other),
            }
        }
        if !clean_end && stream.status() != StreamStatus::Error {
            stream.ingest(StreamEvent::Error {
                message: "stream ended unexpectedly".to_string(),
            });
        }
        self.finalize(&stream).await;
    }

    /// Persist the turn, announce the title if one was derived, emit
    /// `done`, and schedule the registry cleanup.
    async fn finalize(self: &Arc<Self>, stream: &Arc<ActiveStream>) {
        let content = strip_tool_call_xml(&stream.full_content());
        let tool_calls = stream.tool_calls();
        match self
            .sink
            .persist_turn(&stream.conversation_id, &content, &tool_calls)
            .await
        {
            Ok(Some(title)) => stream.ingest(StreamEvent::Title { title }),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    conversation = %stream.conversation_id,
                    error = %e,
                    "Failed to persist turn"
                );
            }
        }
        stream.ingest(StreamEvent::Done);
        stream.close(StreamStatus::Complete);
        tracing::info!(
            conversation = %stream.conversation_id,
            events = stream.buffered_len(),
            status = ?stream.status(),
            "Stream finalized"
        );

        let manager = self.clone();
        let conversation_id = stream.conversation_id.clone();
        let stream = stream.clone();
        tokio::spawn(async move {
            tokio::time::sleep(manager.linger).await;
            let mut streams = manager.streams.lock();
            if let Some(current) = streams.get(&conversation_id) {
                if Arc::ptr_eq(current, &stream) {
                    streams.remove(&conversation_id);
                    tracing::debug!(conversation = %conversation_id, "Stream dropped from registry");
                }
            }
        });
    }
}
