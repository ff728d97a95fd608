//! willow-agent: isolated sub-agent processes and their plumbing
//!
//! A sub-agent is an opaque child process sharing nothing with the parent
//! but the filesystem snapshot, the tool endpoint named in its config, and
//! the event-bus socket. The [`AgentRunner`] spawns and streams one; the
//! [`EventBus`] carries events from grandchildren that have no pipe of
//! their own; [`AbortHandle`] cuts everything short.

pub mod abort;
pub mod bus;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod runner;

pub use abort::AbortHandle;
pub use bus::{BusClient, BusEnvelope, EventBus};
pub use error::{AgentError, Result};
pub use parser::{EventParser, RecordedToolCall};
pub use runner::{AgentCommand, AgentOutcome, AgentRunner, AgentSpec, DEFAULT_MAX_TURNS};
