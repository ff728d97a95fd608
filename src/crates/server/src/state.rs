//! Shared application state

use crate::config::Config;
use crate::conversations::ConversationStore;
use std::sync::Arc;
use willow_agent::AgentRunner;
use willow_graph::GraphStore;
use willow_pipeline::{Coordinator, MaintenanceManager, TurnPipeline, TurnRegistry};
use willow_stream::StreamManager;
use willow_tools::ToolHandler;
use willow_vcs::Vcs;

/// Everything the handlers need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<GraphStore>,
    pub vcs: Arc<Vcs>,
    pub streams: Arc<StreamManager>,
    pub conversations: Arc<ConversationStore>,
    pub tools: Arc<ToolHandler>,
    pub turn_pipeline: Arc<TurnPipeline>,
    pub coordinator: Arc<Coordinator>,
    pub maintenance: Arc<MaintenanceManager>,
    pub registry: Arc<TurnRegistry>,
}

impl AppState {
    /// Wire the whole engine together. `tool_endpoint` is the URL
    /// sub-agent processes call back into; it must match the bound
    /// address.
    pub fn build(config: &Config, tool_endpoint: &str) -> anyhow::Result<AppState> {
        let store = Arc::new(GraphStore::open(&config.graph_path())?);
        let vcs = Arc::new(Vcs::open(store.clone())?);
        vcs.init()?;

        let conversations = Arc::new(ConversationStore::new(&config.conversations_dir())?);
        let streams = StreamManager::new(conversations.clone());
        let runner = AgentRunner::new(config.agent_command());
        let registry = Arc::new(TurnRegistry::new());

        let turn_pipeline = Arc::new(TurnPipeline::new(
            runner.clone(),
            vcs.clone(),
            registry.clone(),
            tool_endpoint,
        ));
        let coordinator = Arc::new(Coordinator::new(
            runner.clone(),
            registry.clone(),
            tool_endpoint,
        ));
        let maintenance = MaintenanceManager::new(
            store.clone(),
            vcs.clone(),
            runner,
            tool_endpoint,
            config.maintenance_options(),
        );
        let tools = Arc::new(ToolHandler::new(store.clone()));

        Ok(AppState {
            store,
            vcs,
            streams,
            conversations,
            tools,
            turn_pipeline,
            coordinator,
            maintenance,
            registry,
        })
    }

    /// Abort in-flight turns and maintenance; used at shutdown.
    pub fn abort_all(&self) {
        self.registry.abort_all();
        self.maintenance.abort();
    }
}
