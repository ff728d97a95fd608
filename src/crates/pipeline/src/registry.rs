//! Registry of in-flight turns
//!
//! The tool endpoint needs to route a chat agent's `search_memories` call
//! to the turn that spawned it; this registry is the rendezvous. One entry
//! per conversation while its turn is running.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use willow_agent::AbortHandle;

/// What a running turn exposes to the tool endpoint
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Path of the turn's event-bus socket
    pub bus_path: PathBuf,
    /// Abort signal covering the turn's sub-agents
    pub abort: AbortHandle,
}

/// Process-wide map of running turns
#[derive(Default)]
pub struct TurnRegistry {
    turns: Mutex<HashMap<String, TurnContext>>,
}

impl TurnRegistry {
    pub fn new() -> TurnRegistry {
        TurnRegistry::default()
    }

    pub fn register(&self, conversation_id: &str, context: TurnContext) {
        self.turns
            .lock()
            .insert(conversation_id.to_string(), context);
    }

    pub fn get(&self, conversation_id: &str) -> Option<TurnContext> {
        self.turns.lock().get(conversation_id).cloned()
    }

    pub fn unregister(&self, conversation_id: &str) {
        self.turns.lock().remove(conversation_id);
    }

    /// Abort every running turn; used at shutdown.
    pub fn abort_all(&self) {
        for context in self.turns.lock().values() {
            context.abort.abort();
        }
    }
}
