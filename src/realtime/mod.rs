//! Realtime voice: the shared session, its transport and history projection.

pub mod factory;
pub mod items;
pub mod manager;
pub mod transport;

#[cfg(test)]
mod testing;

pub use factory::{RealtimeSession, SessionFactory, connect_and_setup};
pub use items::{RealtimeItem, VoiceMessage, VoiceView, project_messages};
pub use manager::{LifecycleState, ObserverId, SessionManager, SessionObserver, VoiceSubscription};
pub use transport::{
    HistoryHandler, ListenerId, RealtimeTransport, TransportBuilder, TransportEvent,
    WebSocketTransport, WebSocketTransportBuilder,
};
