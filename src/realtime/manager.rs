//! Process-wide realtime session lifecycle.
//!
//! At most one session exists at a time and it is shared by every observer.
//! The first observer triggers creation, later ones join the existing or
//! in-flight session, and the last one to leave tears it down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::factory::{RealtimeSession, SessionFactory, connect_and_setup};
use super::items::{RealtimeItem, VoiceView, project_messages};
use super::transport::{HistoryHandler, ListenerId, TransportEvent};
use crate::auth::CredentialSource;
use crate::error::TransportError;

/// Something that wants to follow the shared session.
pub trait SessionObserver: Send + Sync {
    /// The session is connected (or already was when the observer joined).
    fn on_session_ready(&self, session: &Arc<RealtimeSession>);

    /// The full item history after a change.
    fn on_history_updated(&self, items: &[RealtimeItem]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoSession,
    Creating,
    HasSession,
}

struct ActiveSession {
    session: Arc<RealtimeSession>,
    listener: ListenerId,
}

impl ActiveSession {
    fn shutdown(self) {
        self.session
            .transport()
            .off(TransportEvent::HistoryUpdated, self.listener);
        self.session.close();
        info!(session_id = %self.session.id(), "Realtime session closed");
    }
}

#[derive(Default)]
struct Lifecycle {
    session: Option<ActiveSession>,
    creating: bool,
    observers: HashMap<ObserverId, Arc<dyn SessionObserver>>,
    next_observer: u64,
}

/// Owns the shared realtime session and its observer set.
pub struct SessionManager {
    factory: SessionFactory,
    credentials: Arc<dyn CredentialSource>,
    state: Mutex<Lifecycle>,
}

impl SessionManager {
    pub fn new(factory: SessionFactory, credentials: Arc<dyn CredentialSource>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            credentials,
            state: Mutex::new(Lifecycle::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an observer. Starts creation when no session exists or is pending.
    pub fn register(self: &Arc<Self>, observer: Arc<dyn SessionObserver>) -> ObserverId {
        let (id, existing, start) = {
            let mut state = self.lock();
            let id = ObserverId(state.next_observer);
            state.next_observer += 1;
            state.observers.insert(id, Arc::clone(&observer));

            let existing = state.session.as_ref().map(|a| Arc::clone(&a.session));
            let start = existing.is_none() && !state.creating;
            if start {
                state.creating = true;
            }
            (id, existing, start)
        };

        if let Some(session) = existing {
            debug!(observer = id.0, session_id = %session.id(), "Observer joined existing session");
            observer.on_session_ready(&session);
        }
        if start {
            info!("Creating realtime session");
            let manager = Arc::clone(self);
            tokio::spawn(async move { manager.create_session().await });
        }
        id
    }

    /// Remove an observer. The last one out closes the session.
    pub fn unregister(&self, id: ObserverId) {
        let teardown = {
            let mut state = self.lock();
            if state.observers.remove(&id).is_none() {
                return;
            }
            if state.observers.is_empty() {
                state.session.take()
            } else {
                None
            }
        };
        if let Some(active) = teardown {
            active.shutdown();
        }
    }

    /// Register a view observer; dropping the subscription unregisters it.
    pub fn subscribe(self: &Arc<Self>) -> VoiceSubscription {
        let (tx, rx) = watch::channel(VoiceView::loading());
        let id = self.register(Arc::new(ViewObserver { view: tx }));
        VoiceSubscription {
            manager: Arc::clone(self),
            id,
            view: rx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        let state = self.lock();
        if state.session.is_some() {
            LifecycleState::HasSession
        } else if state.creating {
            LifecycleState::Creating
        } else {
            LifecycleState::NoSession
        }
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    pub fn current_session(&self) -> Option<Arc<RealtimeSession>> {
        self.lock().session.as_ref().map(|a| Arc::clone(&a.session))
    }

    async fn create_session(self: Arc<Self>) {
        let outcome = self.open_session().await;

        let mut discard = None;
        let mut ready = Vec::new();
        let published = {
            let mut state = self.lock();
            state.creating = false;
            match outcome {
                Ok(active) if state.observers.is_empty() => {
                    discard = Some(active);
                    None
                }
                Ok(active) => {
                    let session = Arc::clone(&active.session);
                    state.session = Some(active);
                    ready = state.observers.values().cloned().collect::<Vec<_>>();
                    Some(session)
                }
                Err(e) => {
                    warn!(error = %e, kind = ?e.kind(), "Failed to create realtime session");
                    None
                }
            }
        };

        if let Some(active) = discard {
            debug!("No observers left when session resolved; closing it");
            active.shutdown();
        }
        if let Some(session) = published {
            for observer in ready {
                observer.on_session_ready(&session);
            }
        }
    }

    async fn open_session(self: &Arc<Self>) -> Result<ActiveSession, TransportError> {
        let credential = self.credentials.realtime_credential().await?;
        let session = Arc::new(self.factory.build_session());

        let manager = Arc::downgrade(self);
        let handler: HistoryHandler = Arc::new(move |items: &[RealtimeItem]| {
            if let Some(manager) = manager.upgrade() {
                manager.dispatch_history(items);
            }
        });

        match connect_and_setup(&session, &credential, handler).await {
            Ok(listener) => Ok(ActiveSession { session, listener }),
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    fn dispatch_history(&self, items: &[RealtimeItem]) {
        let observers: Vec<Arc<dyn SessionObserver>> =
            self.lock().observers.values().cloned().collect();
        for observer in observers {
            observer.on_history_updated(items);
        }
    }
}

struct ViewObserver {
    view: watch::Sender<VoiceView>,
}

impl SessionObserver for ViewObserver {
    fn on_session_ready(&self, _session: &Arc<RealtimeSession>) {
        self.view.send_modify(|view| view.loading = false);
    }

    fn on_history_updated(&self, items: &[RealtimeItem]) {
        let messages = project_messages(items);
        self.view.send_modify(|view| view.messages = messages);
    }
}

/// A consumer's handle on the shared session.
pub struct VoiceSubscription {
    manager: Arc<SessionManager>,
    id: ObserverId,
    view: watch::Receiver<VoiceView>,
}

impl VoiceSubscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Current view snapshot.
    pub fn view(&self) -> VoiceView {
        self.view.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<VoiceView> {
        self.view.clone()
    }

    /// Wait for the next view change.
    pub async fn changed(&mut self) -> Option<VoiceView> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }
}

impl Drop for VoiceSubscription {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}
