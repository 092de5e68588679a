//! Text chat REST endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::AppState;
use crate::agents::{ConversationTurn, OrchestrationResult};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(send_message))
        .route("/api/chat/history", get(history))
        .route("/api/chat/agent", get(current_agent))
        .route("/api/chat/reset", post(reset))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<OrchestrationResult>, StatusCode> {
    debug!(len = req.message.len(), "Chat message received");

    // The turn owns the lock in its own task, so a dropped request still
    // lets it finish and record history.
    let orchestrator = Arc::clone(&state.orchestrator);
    let turn = tokio::spawn(async move {
        let mut orchestrator = orchestrator.lock_owned().await;
        orchestrator.send_message(&req.message).await
    });

    match turn.await {
        Ok(result) => {
            if result.handoff_occurred {
                info!(agent = %result.agent, "Conversation handed off");
            }
            Ok(Json(result))
        }
        Err(e) => {
            error!(error = %e, "Chat turn task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn history(State(state): State<AppState>) -> Json<Vec<ConversationTurn>> {
    Json(state.orchestrator.lock().await.get_conversation_history())
}

async fn current_agent(State(state): State<AppState>) -> impl IntoResponse {
    let agent = state.orchestrator.lock().await.get_current_agent();
    Json(serde_json::json!({ "agent": agent }))
}

async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.lock().await.reset();
    info!("Conversation reset");
    StatusCode::NO_CONTENT
}
