//! Voice observer WebSocket. Each connection is one session observer.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use super::AppState;
use crate::realtime::SessionManager;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/ws/voice", get(voice_ws_handler))
}

async fn voice_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Voice client connecting");
    ws.on_upgrade(|socket| handle_voice_socket(socket, state.sessions))
}

async fn handle_voice_socket(mut socket: WebSocket, sessions: Arc<SessionManager>) {
    let subscription = sessions.subscribe();
    info!(observers = sessions.observer_count(), "Voice client connected");

    // Yields the current view first, then every change.
    let mut views = WatchStream::new(subscription.receiver());

    loop {
        tokio::select! {
            view = views.next() => {
                let Some(view) = view else {
                    debug!("Voice view channel closed");
                    break;
                };
                match serde_json::to_string(&view) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("Voice client disconnected during send");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize voice view"),
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Voice client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Voice WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(subscription);
    debug!(observers = sessions.observer_count(), "Voice observer released");
}
