//! AgentOrchestrator: owns conversation history and the active persona,
//! drives one engine turn per user message, and recovers from failures.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;

use super::codec::{ConversationTurn, render_items};
use super::engine::ChatEngine;
use super::handoff::detect_handoff;
use super::persona::{Persona, PersonaKind, build_personas};
use super::prompts::APOLOGY_MESSAGE;
use crate::auth::AuthProvider;
use crate::config::PromptConfig;
use crate::error::{EngineError, FailureKind};

/// Outcome of one `send_message` call. The history is a snapshot copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub response: String,
    pub agent: PersonaKind,
    pub handoff_occurred: bool,
    pub conversation_history: Vec<ConversationTurn>,
}

/// Coordinates the Interview → Concierge conversation.
///
/// `send_message` takes `&mut self`, so one instance serves one turn at a
/// time. Callers that share an orchestrator wrap it in a mutex.
pub struct AgentOrchestrator {
    auth: Arc<dyn AuthProvider>,
    engine: Arc<dyn ChatEngine>,
    /// Entry persona for every run; embeds the concierge handoff target.
    entry: Persona,
    history: Vec<ConversationTurn>,
    current: PersonaKind,
    last_failure: Option<FailureKind>,
}

impl AgentOrchestrator {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        engine: Arc<dyn ChatEngine>,
        prompts: &PromptConfig,
    ) -> Self {
        Self {
            auth,
            engine,
            entry: build_personas(prompts),
            history: Vec::new(),
            current: PersonaKind::Interview,
            last_failure: None,
        }
    }

    /// Send one user utterance through the engine. Never fails: errors are
    /// logged and turned into an apology turn.
    pub async fn send_message(&mut self, text: &str) -> OrchestrationResult {
        self.history.push(ConversationTurn::user(text, self.current));

        let (response, handoff_occurred) = match self.run_turn().await {
            Ok(outcome) => {
                self.last_failure = None;
                outcome
            }
            Err(e) => {
                let kind = e.kind();
                tracing::error!(
                    agent = %self.current,
                    kind = ?kind,
                    error = %e,
                    "Error in agent orchestrator"
                );
                self.last_failure = Some(kind);
                (APOLOGY_MESSAGE.to_string(), false)
            }
        };

        self.history
            .push(ConversationTurn::assistant(response.clone(), self.current));

        OrchestrationResult {
            response,
            agent: self.current,
            handoff_occurred,
            conversation_history: self.history.clone(),
        }
    }

    /// Steps 2–4 of a turn. The persona only changes after the engine
    /// returned successfully.
    async fn run_turn(&mut self) -> Result<(String, bool), EngineError> {
        if !self.auth.is_authenticated() {
            return Err(EngineError::AuthenticationRequired);
        }
        let client = self
            .auth
            .client()
            .ok_or(EngineError::AuthenticationRequired)?;

        let items = render_items(&self.history);
        let output = AssertUnwindSafe(self.engine.run(&client, &self.entry, &items))
            .catch_unwind()
            .await
            .map_err(|panic| EngineError::Unknown(panic_message(panic.as_ref())))??;

        let text = output.final_output.unwrap_or_default();

        let mut handoff_occurred = false;
        if detect_handoff(output.trace.as_ref())
            && let Some(next) = self.current.next()
            && self.current.can_transition_to(next)
        {
            tracing::info!(from = %self.current, to = %next, "Persona handoff");
            self.current = next;
            handoff_occurred = true;
        }

        Ok((text, handoff_occurred))
    }

    /// Copy of the full history, system turns included.
    pub fn get_conversation_history(&self) -> Vec<ConversationTurn> {
        self.history.clone()
    }

    pub fn get_current_agent(&self) -> PersonaKind {
        self.current
    }

    /// Failure kind of the most recent turn, `None` if it succeeded.
    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Start over: empty history, back to the interview persona.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = PersonaKind::Interview;
        self.last_failure = None;
        tracing::debug!("Orchestrator reset");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}
