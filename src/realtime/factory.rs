//! Builds realtime voice sessions and brings them online.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use super::transport::{
    HistoryHandler, ListenerId, RealtimeTransport, TransportBuilder, TransportEvent,
};
use crate::agents::persona::Persona;
use crate::config::{PromptConfig, RealtimeConfig};
use crate::error::TransportError;

/// A realtime session bound to an entry persona and a transport.
pub struct RealtimeSession {
    id: Uuid,
    agent: Persona,
    config: RealtimeConfig,
    transport: Arc<dyn RealtimeTransport>,
    created_at: DateTime<Utc>,
}

impl RealtimeSession {
    pub fn new(agent: Persona, config: RealtimeConfig, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent,
            config,
            transport,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn agent(&self) -> &Persona {
        &self.agent
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn RealtimeTransport> {
        &self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The `session.update` event that configures the server side.
    pub fn session_update(&self) -> Value {
        json!({
            "type": "session.update",
            "session": {
                "instructions": self.agent.instructions,
                "input_audio_format": self.config.input_audio_format.as_str(),
                "output_audio_format": self.config.output_audio_format.as_str(),
                "input_audio_transcription": {"model": self.config.transcription_model},
                "tools": self.agent.handoff_tools(),
            }
        })
    }

    /// Open the transport and push the session configuration.
    pub async fn connect(&self, credential: &SecretString) -> Result<(), TransportError> {
        self.transport.connect(credential).await?;
        self.transport.send_event(self.session_update()).await
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("id", &self.id)
            .field("agent", &self.agent.name())
            .field("model", &self.config.model)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Assembles personas and sessions from configuration.
pub struct SessionFactory {
    config: RealtimeConfig,
    prompts: PromptConfig,
    transports: Arc<dyn TransportBuilder>,
}

impl SessionFactory {
    pub fn new(
        config: RealtimeConfig,
        prompts: PromptConfig,
        transports: Arc<dyn TransportBuilder>,
    ) -> Self {
        Self {
            config,
            prompts,
            transports,
        }
    }

    pub fn create_concierge_persona(&self) -> Persona {
        Persona::concierge(&self.prompts.concierge)
    }

    pub fn create_interview_persona(&self, concierge: Persona) -> Persona {
        Persona::interview(&self.prompts.interview, concierge)
    }

    /// Wrap `agent` in a new session with a fresh transport. Does not connect.
    pub fn create_realtime_session(&self, agent: Persona) -> RealtimeSession {
        let transport = self.transports.build(&self.config);
        RealtimeSession::new(agent, self.config.clone(), transport)
    }

    /// Concierge, then interview, then the session around the interview.
    pub fn build_session(&self) -> RealtimeSession {
        let concierge = self.create_concierge_persona();
        let interview = self.create_interview_persona(concierge);
        self.create_realtime_session(interview)
    }
}

/// Connect, subscribe to history updates, then ask the agent to greet.
///
/// A failed greeting is logged and does not fail the setup.
pub async fn connect_and_setup(
    session: &RealtimeSession,
    credential: &SecretString,
    on_history_updated: HistoryHandler,
) -> Result<ListenerId, TransportError> {
    session.connect(credential).await?;
    info!(
        session_id = %session.id(),
        agent = session.agent().name(),
        model = %session.config().model,
        "Realtime session connected"
    );

    let listener = session
        .transport()
        .on(TransportEvent::HistoryUpdated, on_history_updated);

    if let Err(e) = session
        .transport()
        .send_event(json!({"type": "response.create"}))
        .await
    {
        warn!(session_id = %session.id(), error = %e, "Failed to trigger automatic greeting");
    }

    Ok(listener)
}
