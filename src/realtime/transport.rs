//! Realtime transport seam and its WebSocket implementation.
//!
//! A transport owns one bidirectional connection. It keeps the conversation
//! item history that the server reports and emits `history_updated` with the
//! full list after every change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, info, warn};

use super::items::RealtimeItem;
use crate::config::RealtimeConfig;
use crate::error::TransportError;

/// Callback receiving the full item history after each change.
pub type HistoryHandler = Arc<dyn Fn(&[RealtimeItem]) + Send + Sync>;

/// Events a transport emits to registered handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    HistoryUpdated,
}

impl TransportEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoryUpdated => "history_updated",
        }
    }
}

/// Handle returned by [`RealtimeTransport::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// One realtime connection.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open the connection with an ephemeral credential.
    async fn connect(&self, credential: &SecretString) -> Result<(), TransportError>;

    fn on(&self, event: TransportEvent, handler: HistoryHandler) -> ListenerId;

    fn off(&self, event: TransportEvent, id: ListenerId);

    /// Queue a client event (e.g. `session.update`, `response.create`).
    async fn send_event(&self, event: Value) -> Result<(), TransportError>;

    fn close(&self);
}

/// Builds a fresh transport for each session.
pub trait TransportBuilder: Send + Sync {
    fn build(&self, config: &RealtimeConfig) -> Arc<dyn RealtimeTransport>;
}

/// Handler registry shared between a transport and its reader task.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<ListenerId, (TransportEvent, HistoryHandler)>>,
}

impl Listeners {
    pub fn add(&self, event: TransportEvent, handler: HistoryHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (event, handler));
        id
    }

    pub fn remove(&self, event: TransportEvent, id: ListenerId) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if handlers.get(&id).is_some_and(|(e, _)| *e == event) {
            handlers.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler for `event`. Handlers run outside the lock.
    pub fn emit(&self, event: TransportEvent, items: &[RealtimeItem]) {
        let handlers: Vec<HistoryHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(e, _)| *e == event)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(items);
        }
    }
}

/// Apply one server event to the local history. Returns whether it changed.
pub fn apply_server_event(history: &mut Vec<RealtimeItem>, event: &Value) -> bool {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "conversation.item.created" | "conversation.item.added" | "response.output_item.done" => {
            let Some(item) = event.get("item") else {
                return false;
            };
            upsert(history, RealtimeItem(item.clone()));
            true
        }
        "conversation.item.input_audio_transcription.completed" => {
            let Some(item_id) = event.get("item_id").and_then(Value::as_str) else {
                return false;
            };
            let index = event
                .get("content_index")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let transcript = event.get("transcript").cloned().unwrap_or(Value::Null);

            let Some(item) = history.iter_mut().find(|i| i.id() == Some(item_id)) else {
                return false;
            };
            let part = item
                .0
                .get_mut("content")
                .and_then(Value::as_array_mut)
                .and_then(|parts| parts.get_mut(index))
                .and_then(Value::as_object_mut);
            match part {
                Some(part) => {
                    part.insert("transcript".to_string(), transcript);
                    true
                }
                None => false,
            }
        }
        "conversation.item.deleted" => {
            let Some(item_id) = event.get("item_id").and_then(Value::as_str) else {
                return false;
            };
            let before = history.len();
            history.retain(|i| i.id() != Some(item_id));
            history.len() != before
        }
        _ => false,
    }
}

fn upsert(history: &mut Vec<RealtimeItem>, item: RealtimeItem) {
    let existing = item
        .id()
        .and_then(|id| history.iter().position(|i| i.id() == Some(id)));
    match existing {
        Some(pos) => history[pos] = item,
        None => history.push(item),
    }
}

/// Transport over the realtime WebSocket API.
pub struct WebSocketTransport {
    url: String,
    listeners: Arc<Listeners>,
    history: Arc<Mutex<Vec<RealtimeItem>>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            url: format!("{}?model={}", config.url, config.model),
            listeners: Arc::new(Listeners::default()),
            history: Arc::new(Mutex::new(Vec::new())),
            outgoing: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn connect(&self, credential: &SecretString) -> Result<(), TransportError> {
        let connect_failed = |reason: String| TransportError::ConnectFailed { reason };

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_failed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose_secret()))
            .map_err(|e| connect_failed(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        info!(url = %self.url, "Realtime socket connected");

        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let listeners = Arc::clone(&self.listeners);
        let history = Arc::clone(&self.history);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let Ok(event) = serde_json::from_str::<Value>(&text) else {
                            debug!("Ignoring non-JSON realtime frame");
                            continue;
                        };
                        if let Some(error) = event.get("error") {
                            warn!(error = %error, "Realtime server reported an error");
                        }
                        let snapshot = {
                            let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
                            apply_server_event(&mut history, &event).then(|| history.clone())
                        };
                        if let Some(items) = snapshot {
                            listeners.emit(TransportEvent::HistoryUpdated, &items);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Realtime socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Realtime socket error");
                        break;
                    }
                }
            }
        });

        *self.outgoing.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([writer, reader]);
        Ok(())
    }

    fn on(&self, event: TransportEvent, handler: HistoryHandler) -> ListenerId {
        let id = self.listeners.add(event, handler);
        debug!(event = event.as_str(), listener = id.0, "Listener registered");
        id
    }

    fn off(&self, event: TransportEvent, id: ListenerId) {
        self.listeners.remove(event, id);
        debug!(event = event.as_str(), listener = id.0, "Listener removed");
    }

    async fn send_event(&self, event: Value) -> Result<(), TransportError> {
        let outgoing = self.outgoing.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = outgoing.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Message::Text(event.to_string().into()))
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
    }

    fn close(&self) {
        if let Some(tx) = self
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(Message::Close(None));
        }
        // The writer drains the close frame and exits on its own.
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if let Some((_writer, readers)) = tasks.split_first() {
            for reader in readers {
                reader.abort();
            }
        }
        debug!(url = %self.url, "Realtime transport closed");
    }
}

/// Builds [`WebSocketTransport`]s.
pub struct WebSocketTransportBuilder;

impl TransportBuilder for WebSocketTransportBuilder {
    fn build(&self, config: &RealtimeConfig) -> Arc<dyn RealtimeTransport> {
        Arc::new(WebSocketTransport::new(config))
    }
}
