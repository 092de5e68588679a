//! In-memory transport and credential doubles for realtime tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Notify;

use super::items::RealtimeItem;
use super::transport::{
    HistoryHandler, ListenerId, Listeners, RealtimeTransport, TransportBuilder, TransportEvent,
};
use crate::auth::CredentialSource;
use crate::config::RealtimeConfig;
use crate::error::TransportError;

pub fn credential() -> SecretString {
    SecretString::from("ek_test".to_string())
}

#[derive(Default)]
pub struct MockTransport {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    fail_connect: bool,
    fail_greeting: bool,
    connected: AtomicBool,
    listeners: Listeners,
    sent: Mutex<Vec<Value>>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Pretend the server reported a new history.
    pub fn push_history(&self, items: &[RealtimeItem]) {
        self.listeners.emit(TransportEvent::HistoryUpdated, items);
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self, _credential: &SecretString) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(TransportError::ConnectFailed {
                reason: "refused".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on(&self, event: TransportEvent, handler: HistoryHandler) -> ListenerId {
        self.listeners.add(event, handler)
    }

    fn off(&self, event: TransportEvent, id: ListenerId) {
        self.listeners.remove(event, id);
    }

    async fn send_event(&self, event: Value) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_greeting && event["type"] == "response.create" {
            return Err(TransportError::SendFailed {
                reason: "greeting rejected".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockBuilder {
    fail_connect: bool,
    fail_greeting: bool,
    built: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockBuilder {
    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn failing_greeting() -> Self {
        Self {
            fail_greeting: true,
            ..Default::default()
        }
    }

    pub fn built(&self) -> Vec<Arc<MockTransport>> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total_closes(&self) -> usize {
        self.built()
            .iter()
            .map(|t| t.closes.load(Ordering::SeqCst))
            .sum()
    }
}

impl TransportBuilder for MockBuilder {
    fn build(&self, _config: &RealtimeConfig) -> Arc<dyn RealtimeTransport> {
        let transport = Arc::new(MockTransport {
            fail_connect: self.fail_connect,
            fail_greeting: self.fail_greeting,
            ..Default::default()
        });
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&transport));
        transport
    }
}

/// Credential source that can hold every request until released.
#[derive(Default)]
pub struct MockCredentials {
    pub calls: AtomicUsize,
    fail: bool,
    gate: Option<Notify>,
}

impl MockCredentials {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Default::default()
        }
    }

    /// Let one pending (or the next) credential request complete.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl CredentialSource for MockCredentials {
    async fn realtime_credential(&self) -> Result<SecretString, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(TransportError::AuthenticationRequired);
        }
        Ok(credential())
    }
}
