//! HTTP + WebSocket surface: text chat and the voice observer socket.

mod chat;
mod voice;

use std::sync::Arc;

use axum::{Json, Router, response::IntoResponse, routing::get};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::agents::AgentOrchestrator;
use crate::realtime::SessionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// One orchestrator, one turn at a time.
    pub orchestrator: Arc<Mutex<AgentOrchestrator>>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(orchestrator: AgentOrchestrator, sessions: Arc<SessionManager>) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            sessions,
        }
    }
}

/// Build the router with chat REST routes and the voice WebSocket.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(chat::routes())
        .merge(voice::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gift-concierge"
    }))
}
