//! willow-server: the HTTP/SSE surface of the Willow memory engine
//!
//! Wires the graph store, version control, stream manager, and both
//! pipelines behind an axum router: conversations in, SSE turns out, a
//! tool endpoint for sub-agent processes, and operational endpoints for
//! health and maintenance.

pub mod config;
pub mod conversations;
pub mod error;
pub mod health;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use config::Config;
pub use conversations::{Conversation, ConversationStore, Message, MessageRole};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use shutdown::ShutdownCoordinator;
pub use state::AppState;
