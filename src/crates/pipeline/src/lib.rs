//! willow-pipeline: orchestration around the graph memory
//!
//! Two pipelines share the sub-agent machinery: the per-turn pipeline
//! (search context in, chat reply out, new facts indexed, delta committed)
//! and the background enrichment pipeline (pre-scan, crawlers, resolver,
//! branch merge). Both absorb sub-agent failure; neither lets an auxiliary
//! agent break the user's conversation.

pub mod coordinator;
pub mod error;
pub mod maintenance;
pub mod registry;
pub mod turn;

pub use coordinator::Coordinator;
pub use error::{PipelineError, Result};
pub use maintenance::{
    MaintenanceManager, MaintenanceOptions, MaintenanceProgress, Trigger,
};
pub use registry::{TurnContext, TurnRegistry};
pub use turn::TurnPipeline;
