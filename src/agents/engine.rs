//! Chat engine seam: the orchestrator's view of the underlying LLM runner.
//!
//! `ResponsesEngine` talks to the backend proxy's responses endpoint. It
//! exposes forward handoffs as function tools and, when the model calls one,
//! re-runs the same input under the target persona before returning. The
//! caller sees one `run` per user turn plus a trace of what happened.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::codec::InputItem;
use super::handoff::{ExecutionTrace, TraceEvent};
use super::persona::Persona;
use crate::auth::AuthenticatedClient;
use crate::error::EngineError;

/// Maximum persona hops within a single run.
const MAX_HANDOFF_HOPS: usize = 4;

/// Result of one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Text produced by the last persona that ran, if any.
    pub final_output: Option<String>,
    pub trace: Option<ExecutionTrace>,
}

/// The underlying chat engine.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Run `items` starting from the `entry` persona.
    async fn run(
        &self,
        client: &AuthenticatedClient,
        entry: &Persona,
        items: &[InputItem],
    ) -> Result<EngineOutput, EngineError>;
}

/// Engine backed by the backend proxy's `/v1/responses` endpoint.
pub struct ResponsesEngine {
    model: String,
}

impl ResponsesEngine {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Build the request body for one persona hop.
    pub fn build_request(&self, persona: &Persona, items: &[InputItem]) -> serde_json::Value {
        let tools = persona.handoff_tools();

        let mut body = json!({
            "model": self.model,
            "instructions": persona.instructions,
            "input": items,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }

    async fn call(
        &self,
        client: &AuthenticatedClient,
        persona: &Persona,
        items: &[InputItem],
    ) -> Result<ResponseTurn, EngineError> {
        let resp = client
            .post("/v1/responses")
            .json(&self.build_request(persona, items))
            .send()
            .await
            .map_err(|e| EngineError::InvocationFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EngineError::AuthenticationRequired);
        }
        let body = resp.text().await.map_err(|e| EngineError::InvocationFailed {
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(EngineError::InvocationFailed {
                reason: format!("backend returned {status}: {body}"),
            });
        }

        parse_response(&body)
    }
}

#[async_trait]
impl ChatEngine for ResponsesEngine {
    async fn run(
        &self,
        client: &AuthenticatedClient,
        entry: &Persona,
        items: &[InputItem],
    ) -> Result<EngineOutput, EngineError> {
        let mut persona = entry;
        let mut events = Vec::new();

        for _ in 0..=MAX_HANDOFF_HOPS {
            let turn = self.call(client, persona, items).await?;
            events.extend(turn.tool_calls.iter().map(|name| TraceEvent::tool_call(name)));

            let target = turn
                .tool_calls
                .iter()
                .find_map(|name| persona.handoff_for_tool(name));
            match target {
                Some(target) => {
                    tracing::info!(from = %persona.name(), to = %target.name(), "Engine handoff");
                    events.push(TraceEvent::handoff(target.name()));
                    persona = target;
                }
                None => {
                    return Ok(EngineOutput {
                        final_output: turn.text,
                        trace: Some(ExecutionTrace::with_events(events)),
                    });
                }
            }
        }

        Err(EngineError::InvalidResponse {
            reason: format!("more than {MAX_HANDOFF_HOPS} handoffs in one run"),
        })
    }
}

/// What one responses call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<String>,
}

#[derive(Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Decode a responses body into text and tool calls.
pub fn parse_response(body: &str) -> Result<ResponseTurn, EngineError> {
    let parsed: ResponsesBody =
        serde_json::from_str(body).map_err(|e| EngineError::InvalidResponse {
            reason: e.to_string(),
        })?;

    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();
    for item in parsed.output {
        match item {
            OutputItem::Message { content } => {
                for part in content {
                    if let ContentPart::OutputText { text: t } = part {
                        text.get_or_insert_with(String::new).push_str(&t);
                    }
                }
            }
            OutputItem::FunctionCall { name } => tool_calls.push(name),
            OutputItem::Other => {}
        }
    }

    Ok(ResponseTurn { text, tool_calls })
}
