//! Event emitter: the producer side of a turn's event flow
//!
//! Agents and pipeline phases emit through one of these; the receiver half
//! is handed to the stream manager as the turn's event source.

use crate::event::StreamEvent;
use tokio::sync::mpsc;

/// Cheap-to-clone sender for stream events. Sends to a closed receiver are
/// dropped silently; a consumer going away must not fail a producer.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventEmitter {
    /// Create an emitter and the receiver that consumes its events.
    pub fn channel() -> (EventEmitter, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventEmitter { tx }, rx)
    }

    pub fn emit(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event dropped: no consumer attached");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
