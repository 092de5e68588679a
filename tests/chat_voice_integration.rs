//! Integration tests for the chat REST routes and the voice observer socket.
//!
//! Each test spins up an Axum server on a random port with stub collaborators
//! and exercises the real HTTP / WebSocket contract.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use gift_concierge::agents::{
    AgentOrchestrator, ChatEngine, EngineOutput, ExecutionTrace, InputItem, Persona, TraceEvent,
};
use gift_concierge::auth::{AuthProvider, AuthenticatedClient, CredentialSource};
use gift_concierge::config::{PromptConfig, RealtimeConfig};
use gift_concierge::error::{EngineError, TransportError};
use gift_concierge::realtime::{
    HistoryHandler, LifecycleState, ListenerId, RealtimeItem, RealtimeTransport, SessionFactory,
    SessionManager, TransportBuilder, TransportEvent,
};
use gift_concierge::server::{AppState, app_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────────

struct StubAuth {
    signed_in: AtomicBool,
}

impl AuthProvider for StubAuth {
    fn client(&self) -> Option<AuthenticatedClient> {
        self.signed_in.load(Ordering::SeqCst).then(|| {
            AuthenticatedClient::new("http://127.0.0.1:9", SecretString::from("id".to_string()))
        })
    }
}

/// Replies as the interview on the first call, hands off on the second.
#[derive(Default)]
struct StubEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatEngine for StubEngine {
    async fn run(
        &self,
        _client: &AuthenticatedClient,
        _entry: &Persona,
        _items: &[InputItem],
    ) -> Result<EngineOutput, EngineError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(EngineOutput {
                final_output: Some("Who is the gift for?".to_string()),
                trace: None,
            }),
            1 => Ok(EngineOutput {
                final_output: Some("Here are three ideas.".to_string()),
                trace: Some(ExecutionTrace::with_events(vec![
                    TraceEvent::tool_call("transfer_to_concierge_agent"),
                    TraceEvent::handoff("Concierge Agent"),
                ])),
            }),
            _ => Err(EngineError::InvocationFailed {
                reason: "upstream 500".to_string(),
            }),
        }
    }
}

struct StubCredentials;

#[async_trait]
impl CredentialSource for StubCredentials {
    async fn realtime_credential(&self) -> Result<SecretString, TransportError> {
        Ok(SecretString::from("ek_stub".to_string()))
    }
}

#[derive(Default)]
struct StubTransport {
    closes: AtomicUsize,
    handlers: Mutex<Vec<(ListenerId, HistoryHandler)>>,
}

impl StubTransport {
    fn push_history(&self, items: &[RealtimeItem]) {
        let handlers: Vec<HistoryHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(items);
        }
    }
}

#[async_trait]
impl RealtimeTransport for StubTransport {
    async fn connect(&self, _credential: &SecretString) -> Result<(), TransportError> {
        Ok(())
    }

    fn on(&self, _event: TransportEvent, handler: HistoryHandler) -> ListenerId {
        let mut handlers = self.handlers.lock().unwrap();
        let id = ListenerId(handlers.len() as u64);
        handlers.push((id, handler));
        id
    }

    fn off(&self, _event: TransportEvent, id: ListenerId) {
        self.handlers.lock().unwrap().retain(|(h, _)| *h != id);
    }

    async fn send_event(&self, _event: Value) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StubBuilder {
    built: Mutex<Vec<Arc<StubTransport>>>,
}

impl StubBuilder {
    fn transports(&self) -> Vec<Arc<StubTransport>> {
        self.built.lock().unwrap().clone()
    }
}

impl TransportBuilder for StubBuilder {
    fn build(&self, _config: &RealtimeConfig) -> Arc<dyn RealtimeTransport> {
        let transport = Arc::new(StubTransport::default());
        self.built.lock().unwrap().push(Arc::clone(&transport));
        transport
    }
}

struct Harness {
    port: u16,
    sessions: Arc<SessionManager>,
    transports: Arc<StubBuilder>,
}

/// Start an Axum server on a random port.
async fn start_server(signed_in: bool) -> Harness {
    let auth = Arc::new(StubAuth {
        signed_in: AtomicBool::new(signed_in),
    });
    let orchestrator = AgentOrchestrator::new(
        auth,
        Arc::new(StubEngine::default()),
        &PromptConfig::default(),
    );

    let transports = Arc::new(StubBuilder::default());
    let factory = SessionFactory::new(
        RealtimeConfig::default(),
        PromptConfig::default(),
        transports.clone(),
    );
    let sessions = SessionManager::new(factory, Arc::new(StubCredentials));

    let app = app_routes(AppState::new(orchestrator, Arc::clone(&sessions)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness {
        port,
        sessions,
        transports,
    }
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

async fn post_chat(port: u16, message: &str) -> Value {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/chat"))
        .json(&json!({ "message": message }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// ── REST Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        let resp = reqwest::get(format!("http://127.0.0.1:{}/health", h.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn chat_turns_hand_off_once() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;

        let first = post_chat(h.port, "I need a gift").await;
        assert_eq!(first["response"], "Who is the gift for?");
        assert_eq!(first["agent"], "Interview Agent");
        assert_eq!(first["handoffOccurred"], false);

        let second = post_chat(h.port, "my sister, she loves hiking").await;
        assert_eq!(second["response"], "Here are three ideas.");
        assert_eq!(second["agent"], "Concierge Agent");
        assert_eq!(second["handoffOccurred"], true);
        assert_eq!(second["conversationHistory"].as_array().unwrap().len(), 4);

        let agent: Value = reqwest::get(format!("http://127.0.0.1:{}/api/chat/agent", h.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(agent["agent"], "Concierge Agent");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn engine_failure_returns_apology_and_keeps_persona() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        post_chat(h.port, "hi").await;
        post_chat(h.port, "details").await;

        let failed = post_chat(h.port, "more ideas?").await;
        assert_eq!(
            failed["response"],
            "I apologize, but I encountered an error. Please try again."
        );
        assert_eq!(failed["agent"], "Concierge Agent");
        assert_eq!(failed["handoffOccurred"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unauthenticated_chat_is_apology() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(false).await;
        let result = post_chat(h.port, "hello").await;
        assert_eq!(
            result["response"],
            "I apologize, but I encountered an error. Please try again."
        );
        assert_eq!(result["agent"], "Interview Agent");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn history_and_reset() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        post_chat(h.port, "hello").await;

        let history: Value = reqwest::get(format!("http://127.0.0.1:{}/api/chat/history", h.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let turns = history.as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[0]["content"], "hello");
        assert_eq!(turns[1]["role"], "assistant");

        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/api/chat/reset", h.port))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let history: Value = reqwest::get(format!("http://127.0.0.1:{}/api/chat/history", h.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.as_array().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Voice WebSocket Tests ───────────────────────────────────────────────

/// Read views until one satisfies `pred`.
async fn next_view_where<S>(ws: &mut S, pred: impl Fn(&Value) -> bool) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        let view = parse_ws_json(&msg);
        if pred(&view) {
            return view;
        }
    }
}

#[tokio::test]
async fn voice_clients_share_one_session() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        let url = format!("ws://127.0.0.1:{}/ws/voice", h.port);

        let (mut first, _) = connect_async(&url).await.expect("WS connect failed");
        let (mut second, _) = connect_async(&url).await.expect("WS connect failed");

        next_view_where(&mut first, |v| v["loading"] == false).await;
        next_view_where(&mut second, |v| v["loading"] == false).await;

        assert_eq!(h.transports.transports().len(), 1);
        assert_eq!(h.sessions.state(), LifecycleState::HasSession);
        assert_eq!(h.sessions.observer_count(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn voice_history_is_projected_to_every_client() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        let url = format!("ws://127.0.0.1:{}/ws/voice", h.port);

        let (mut first, _) = connect_async(&url).await.unwrap();
        let (mut second, _) = connect_async(&url).await.unwrap();
        next_view_where(&mut first, |v| v["loading"] == false).await;
        next_view_where(&mut second, |v| v["loading"] == false).await;

        let transport = h.transports.transports().remove(0);
        transport.push_history(&[
            RealtimeItem(json!({
                "itemId": "u1", "type": "message", "role": "user",
                "content": [{"type": "input_audio", "transcript": "a gift for my dad"}]
            })),
            RealtimeItem(json!({
                "itemId": "a1", "type": "message", "role": "assistant",
                "content": [{"type": "audio", "transcript": "What does he enjoy?"}]
            })),
        ]);

        for ws in [&mut first, &mut second] {
            let view = next_view_where(ws, |v| !v["messages"].as_array().unwrap().is_empty()).await;
            let messages = view["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0]["role"], "user");
            assert_eq!(messages[0]["content"], "a gift for my dad");
            assert_eq!(messages[1]["id"], "a1");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn last_voice_client_leaving_closes_session() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;
        let url = format!("ws://127.0.0.1:{}/ws/voice", h.port);

        let (mut ws, _) = connect_async(&url).await.unwrap();
        next_view_where(&mut ws, |v| v["loading"] == false).await;

        ws.send(Message::Close(None)).await.unwrap();
        drop(ws);

        while h.sessions.state() != LifecycleState::NoSession {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let transport = h.transports.transports().remove(0);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.sessions.observer_count(), 0);
    })
    .await
    .expect("test timed out");
}
