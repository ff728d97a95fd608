//! willow-stream: broadcast streaming for in-flight generations
//!
//! One [`ActiveStream`] per conversation buffers every event of the turn
//! so any number of clients can attach mid-flight and observe the same
//! sequence. The SSE codec in [`sse`] is the client wire format; the
//! [`EventEmitter`] is the producer handle used by the pipeline and agent
//! runners.

pub mod emitter;
pub mod error;
pub mod event;
pub mod manager;
pub mod sse;

pub use emitter::EventEmitter;
pub use error::{Result, StreamError};
pub use event::{strip_tool_call_xml, PhaseMark, StreamEvent, ToolPhase};
pub use manager::{
    ActiveStream, NullSink, StreamManager, StreamSink, StreamStatus, Subscription,
    ToolCallRecord, LINGER_AFTER_DONE,
};
