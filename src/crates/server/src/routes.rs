//! API route definitions and handlers

use crate::conversations::{Conversation, ConversationSummary};
use crate::error::{ApiError, ApiResult};
use crate::health;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use willow_agent::AbortHandle;
use willow_graph::NodeId;
use willow_stream::{StreamStatus, Subscription};
use willow_tools::{AgentRole, ToolError, ToolHandler, ToolResponse, METHOD_NOT_FOUND};

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/messages", post(post_message))
        .route("/api/conversations/:id/stream", get(reconnect_stream))
        .route(
            "/api/maintenance",
            post(trigger_maintenance).get(maintenance_status),
        )
        .route("/api/tools/call", post(call_tool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<health::HealthReport> {
    Json(health::report(&state))
}

async fn create_conversation(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state
        .conversations
        .create()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn list_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let list = state
        .conversations
        .list()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(list))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    state
        .conversations
        .get(&id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("conversation '{id}'")))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub content: String,
}

/// Append the user message and run the turn, answering with its SSE
/// stream. When a turn is already streaming for this conversation the
/// existing stream is joined instead of starting another.
async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PostMessageBody>,
) -> ApiResult<Response> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("message content is empty".to_string()));
    }

    if let Some(active) = state.streams.get(&id) {
        if active.status() == StreamStatus::Streaming {
            tracing::warn!(conversation = %id, "Turn already streaming; joining it");
            let subscription = state.streams.subscribe(&id)?;
            return Ok(sse_response(subscription));
        }
    }

    state
        .conversations
        .append_user_message(&id, &body.content)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("conversation '{id}'")))?;

    let (emitter, _active) = state.streams.open_emitter(&id);
    let abort = AbortHandle::new();
    let pipeline = state.turn_pipeline.clone();
    let maintenance = state.maintenance.clone();
    let conversation_id = id.clone();
    let content = body.content.clone();
    tokio::spawn(async move {
        pipeline
            .run_turn(&conversation_id, &content, emitter, abort)
            .await;
        maintenance.record_conversation();
    });

    let subscription = state.streams.subscribe(&id)?;
    Ok(sse_response(subscription))
}

/// Reconnect: replay the buffered log, then stay attached while the turn
/// still streams.
async fn reconnect_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let subscription = state.streams.subscribe(&id)?;
    Ok(sse_response(subscription))
}

fn sse_response(subscription: Subscription) -> Response {
    Sse::new(sse_events(subscription))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn sse_events(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    subscription.into_stream().map(|event| {
        Ok(Event::default()
            .event(event.name())
            .data(event.data().to_string()))
    })
}

async fn trigger_maintenance(State(state): State<AppState>) -> ApiResult<Response> {
    match state
        .maintenance
        .clone()
        .run(willow_pipeline::Trigger::Manual)
    {
        Some(job_id) => Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))).into_response()),
        None => Err(ApiError::Conflict(
            "a maintenance job is already running".to_string(),
        )),
    }
}

async fn maintenance_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "running": state.maintenance.is_running(),
        "progress": state.maintenance.status(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolCallQuery {
    pub role: Option<String>,
    pub conversation: Option<String>,
    pub subtrees: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallBody {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// The sub-agent tool endpoint. `search_memories` routes to the
/// coordinator; everything else is dispatched against the graph under the
/// caller's role, with maintenance roles redirected to the job workspace.
async fn call_tool(
    State(state): State<AppState>,
    Query(query): Query<ToolCallQuery>,
    Json(body): Json<ToolCallBody>,
) -> Response {
    if body.name == "search_memories" {
        let conversation = query.conversation.unwrap_or_default();
        let search_query = body
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let context = state
            .coordinator
            .search_memories(&conversation, search_query)
            .await;
        return Json(ToolResponse::text(context)).into_response();
    }

    let role = parse_role(&query);
    let handler = match &role {
        AgentRole::Crawler { .. } | AgentRole::Resolver => state
            .maintenance
            .maintenance_store()
            .map(|workspace| Arc::new(ToolHandler::new(workspace)))
            .unwrap_or_else(|| state.tools.clone()),
        _ => state.tools.clone(),
    };

    match handler.call(&role, &body.name, body.arguments) {
        Ok(response) => Json(response).into_response(),
        Err(error @ ToolError::UnknownTool(_)) => Json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": METHOD_NOT_FOUND, "message": error.to_string() },
        }))
        .into_response(),
    }
}

/// Unknown or absent roles dispatch as the read-only search role.
fn parse_role(query: &ToolCallQuery) -> AgentRole {
    match query.role.as_deref() {
        Some("chat") => AgentRole::Chat,
        Some("indexer") => AgentRole::Indexer,
        Some("resolver") => AgentRole::Resolver,
        Some("crawler") => AgentRole::Crawler {
            subtrees: query
                .subtrees
                .as_deref()
                .unwrap_or("")
                .split(',')
                .filter(|s| !s.is_empty())
                .map(NodeId::from)
                .collect(),
        },
        _ => AgentRole::Search,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_defaults_to_read_only() {
        let role = parse_role(&ToolCallQuery::default());
        assert_eq!(role, AgentRole::Search);

        let role = parse_role(&ToolCallQuery {
            role: Some("saboteur".to_string()),
            ..Default::default()
        });
        assert_eq!(role, AgentRole::Search);
    }

    #[test]
    fn test_parse_crawler_subtrees() {
        let role = parse_role(&ToolCallQuery {
            role: Some("crawler".to_string()),
            subtrees: Some("work,places".to_string()),
            ..Default::default()
        });
        match role {
            AgentRole::Crawler { subtrees } => {
                assert_eq!(subtrees, vec![NodeId::from("work"), NodeId::from("places")]);
            }
            other => panic!("unexpected role: {other:?}"),
        }
    }
}
