//! The per-turn pipeline: chat, index, commit
//!
//! One invocation binds one user turn. The chat agent streams the reply
//! (pulling memory through the coordinator tool and the bus socket); a
//! non-empty reply is then handed to the indexer agent, which writes new
//! facts through the mutation tools; finally the turn's graph delta is
//! committed with conversation attribution. Commit failure is swallowed:
//! the reply already reached the user.

use crate::registry::{TurnContext, TurnRegistry};
use std::sync::Arc;
use willow_agent::{AbortHandle, AgentRunner, AgentSpec, EventBus};
use willow_stream::{EventEmitter, PhaseMark, StreamEvent};
use willow_tools::AgentRole;
use willow_vcs::{CommitInput, CommitSource, Vcs};

const CHAT_SYSTEM_PROMPT: &str = "\
You are Willow, a personal assistant with a long-term memory graph.\n\
Before answering anything that could touch stored knowledge, call\n\
search_memories with a focused query and ground your reply in what comes\n\
back. Answer plainly; do not mention the memory machinery.";

const INDEXER_SYSTEM_PROMPT: &str = "\
You maintain a personal knowledge graph of atomic facts. Given one\n\
exchange, extract the durable facts the user revealed and store each with\n\
create_node under a fitting top-level category (create the category first\n\
when none fits), linking related facts with add_link and updating nodes\n\
that this exchange supersedes. Use search_nodes and get_context to avoid\n\
duplicates. Store nothing for small talk.";

/// Cap on how much of the user message lands in commit attribution
const SUMMARY_LIMIT: usize = 100;

/// Orchestrates one conversation turn end to end
pub struct TurnPipeline {
    runner: AgentRunner,
    vcs: Arc<Vcs>,
    registry: Arc<TurnRegistry>,
    tool_endpoint: String,
}

impl TurnPipeline {
    pub fn new(
        runner: AgentRunner,
        vcs: Arc<Vcs>,
        registry: Arc<TurnRegistry>,
        tool_endpoint: impl Into<String>,
    ) -> TurnPipeline {
        TurnPipeline {
            runner,
            vcs,
            registry,
            tool_endpoint: tool_endpoint.into(),
        }
    }

    pub fn registry(&self) -> &Arc<TurnRegistry> {
        &self.registry
    }

    pub fn vcs(&self) -> &Arc<Vcs> {
        &self.vcs
    }

    /// Run one turn, emitting every event on `emitter`. Always ends with
    /// `done`; an aborted or failed turn emits `error` first.
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
        emitter: EventEmitter,
        abort: AbortHandle,
    ) {
        tracing::info!(conversation = conversation_id, "Turn started");

        // Bus socket first: grandchild events route into this turn's stream.
        let bus = match EventBus::bind() {
            Ok(bus) => bus,
            Err(e) => {
                tracing::error!(error = %e, "Bus bind failed; aborting turn");
                emitter.emit(StreamEvent::Error {
                    message: "failed to open event channel".to_string(),
                });
                emitter.emit(StreamEvent::Done);
                return;
            }
        };
        let bus_emitter = emitter.clone();
        bus.on_event(move |envelope| {
            if let Some(event) = StreamEvent::from_parts(&envelope.event, &envelope.data) {
                bus_emitter.emit(event);
            }
        });
        self.registry.register(
            conversation_id,
            TurnContext {
                bus_path: bus.path().to_path_buf(),
                abort: abort.clone(),
            },
        );

        let response = self
            .chat_phase(conversation_id, user_message, &emitter, &abort)
            .await;

        if !response.trim().is_empty() && !abort.is_aborted() {
            self.indexer_phase(conversation_id, user_message, &response, &emitter, &abort)
                .await;
        }

        self.commit_turn(conversation_id, user_message);

        if abort.is_aborted() {
            emitter.emit(StreamEvent::Error {
                message: "turn aborted".to_string(),
            });
        }
        emitter.emit(StreamEvent::Done);
        self.registry.unregister(conversation_id);
        bus.close();
        tracing::info!(conversation = conversation_id, "Turn finished");
    }

    async fn chat_phase(
        &self,
        conversation_id: &str,
        user_message: &str,
        emitter: &EventEmitter,
        abort: &AbortHandle,
    ) -> String {
        let mut spec = AgentSpec::new("chat", user_message);
        spec.system_prompt = CHAT_SYSTEM_PROMPT.to_string();
        spec.disallowed_tools = AgentRole::Chat
            .disallowed_tools()
            .into_iter()
            .map(String::from)
            .collect();
        spec.tool_endpoint = format!(
            "{}?role=chat&conversation={}",
            self.tool_endpoint, conversation_id
        );

        let outcome = self.runner.run(&spec, emitter, abort).await;
        if outcome.text.is_empty() {
            tracing::warn!(conversation = conversation_id, "Chat agent produced no reply");
        }
        outcome.text
    }

    async fn indexer_phase(
        &self,
        conversation_id: &str,
        user_message: &str,
        response: &str,
        emitter: &EventEmitter,
        abort: &AbortHandle,
    ) {
        emitter.emit(StreamEvent::IndexerPhase {
            status: PhaseMark::Start,
        });

        let mut spec = AgentSpec::new(
            "indexer",
            format!("User said:\n{user_message}\n\nAssistant replied:\n{response}"),
        );
        spec.system_prompt = INDEXER_SYSTEM_PROMPT.to_string();
        spec.disallowed_tools = AgentRole::Indexer
            .disallowed_tools()
            .into_iter()
            .map(String::from)
            .collect();
        spec.tool_endpoint = format!("{}?role=indexer", self.tool_endpoint);

        let outcome = self.runner.run(&spec, emitter, abort).await;
        tracing::info!(
            conversation = conversation_id,
            mutations = outcome.tool_calls.len(),
            "Indexer finished"
        );

        emitter.emit(StreamEvent::IndexerPhase {
            status: PhaseMark::End,
        });
    }

    /// Commit whatever the turn's agents wrote. Non-fatal on failure.
    fn commit_turn(&self, conversation_id: &str, user_message: &str) {
        if let Err(e) = self.vcs.init() {
            tracing::warn!(error = %e, "VCS init failed; skipping turn commit");
            return;
        }
        let summary: String = user_message.chars().take(SUMMARY_LIMIT).collect();
        let input = CommitInput::new(
            "Conversation turn",
            CommitSource::Conversation {
                conversation_id: Some(conversation_id.to_string()),
                summary: Some(summary),
            },
        );
        match self.vcs.commit_external_changes(input) {
            Ok(Some(hash)) => {
                tracing::info!(conversation = conversation_id, hash = %hash.short(), "Turn committed");
            }
            Ok(None) => {
                tracing::debug!(conversation = conversation_id, "Turn left no graph changes");
            }
            Err(e) => {
                tracing::warn!(conversation = conversation_id, error = %e, "Turn commit failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use willow_agent::AgentCommand;
    use willow_graph::{Graph, GraphStore, NodeId, NodeType};

    fn shell_runner(script: &str) -> AgentRunner {
        AgentRunner::new(AgentCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    fn fixture(script: &str) -> (tempfile::TempDir, Arc<GraphStore>, TurnPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::open(&dir.path().join("graph.json")).unwrap());
        let vcs = Arc::new(Vcs::open(store.clone()).unwrap());
        let pipeline = TurnPipeline::new(
            shell_runner(script),
            vcs,
            Arc::new(TurnRegistry::new()),
            "http://127.0.0.1:0/api/tools/call",
        );
        (dir, store, pipeline)
    }

    const REPLY_SCRIPT: &str = concat!(
        r#"echo '{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}'; "#,
        r#"echo '{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Nice to meet you, Alice."}}'; "#,
        r#"echo '{"type":"content_block_stop","index":0}'"#,
    );

    #[tokio::test]
    async fn test_turn_emits_phases_in_order_and_done_last() {
        let (_dir, _store, pipeline) = fixture(REPLY_SCRIPT);
        let (emitter, mut rx) = EventEmitter::channel();

        pipeline
            .run_turn(
                "c1",
                "My name is Alice and I live in London.",
                emitter,
                AbortHandle::new(),
            )
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        // Chat content precedes the indexer bracket; done is last.
        let content_at = events
            .iter()
            .position(|e| matches!(e, StreamEvent::Content { .. }))
            .unwrap();
        let indexer_start = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    StreamEvent::IndexerPhase {
                        status: PhaseMark::Start
                    }
                )
            })
            .unwrap();
        let indexer_end = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    StreamEvent::IndexerPhase {
                        status: PhaseMark::End
                    }
                )
            })
            .unwrap();
        assert!(content_at < indexer_start);
        assert!(indexer_start < indexer_end);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_turn_commits_graph_changes_with_attribution() {
        let (_dir, store, pipeline) = fixture(REPLY_SCRIPT);
        pipeline.vcs().init().unwrap();
        // The indexer writes through the tool endpoint in production; a
        // direct store write stands in for it here.
        store
            .create_node(
                &NodeId::from(Graph::ROOT_ID),
                NodeType::Category,
                "People",
                None,
                None,
            )
            .unwrap();

        let (emitter, _rx) = EventEmitter::channel();
        pipeline
            .run_turn("c1", "My name is Alice.", emitter, AbortHandle::new())
            .await;

        let log = pipeline.vcs().log(5).unwrap();
        assert_eq!(log[0].source.label(), "conversation");
        match &log[0].source {
            CommitSource::Conversation {
                conversation_id,
                summary,
            } => {
                assert_eq!(conversation_id.as_deref(), Some("c1"));
                assert_eq!(summary.as_deref(), Some("My name is Alice."));
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_reply_skips_indexer() {
        let (_dir, _store, pipeline) = fixture("true");
        let (emitter, mut rx) = EventEmitter::channel();
        pipeline
            .run_turn("c1", "hello", emitter, AbortHandle::new())
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::IndexerPhase { .. })));
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_aborted_turn_errors_then_done() {
        let (_dir, _store, pipeline) = fixture("sleep 60");
        let (emitter, mut rx) = EventEmitter::channel();
        let abort = AbortHandle::new();
        let killer = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            killer.abort();
        });

        pipeline.run_turn("c1", "hello", emitter, abort).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let n = events.len();
        assert!(matches!(events[n - 2], StreamEvent::Error { .. }));
        assert_eq!(events[n - 1], StreamEvent::Done);
    }
}
