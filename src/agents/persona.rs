//! Personas: the closed set of agent configurations the engine runs as.

use serde::{Deserialize, Serialize};

use super::prompts::{CONCIERGE_HANDOFF_DESCRIPTION, HANDOFF_PROMPT_PREFIX};
use crate::config::PromptConfig;

/// The personas of the gift flow.
///
/// Progresses one way only: Interview → Concierge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonaKind {
    #[default]
    #[serde(rename = "Interview Agent")]
    Interview,
    #[serde(rename = "Concierge Agent")]
    Concierge,
}

impl PersonaKind {
    /// Display label, also the key engine traces use for this persona.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interview => "Interview Agent",
            Self::Concierge => "Concierge Agent",
        }
    }

    /// Check if a handoff from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: PersonaKind) -> bool {
        matches!((self, target), (Self::Interview, Self::Concierge))
    }

    /// The persona this one hands off to, if any.
    pub fn next(&self) -> Option<PersonaKind> {
        match self {
            Self::Interview => Some(Self::Concierge),
            Self::Concierge => None,
        }
    }
}

impl std::fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of the tool an agent calls to hand off to `target`.
///
/// `"Concierge Agent"` becomes `transfer_to_concierge_agent`.
pub fn handoff_tool_name(target: &str) -> String {
    let snake = target
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    format!("transfer_to_{snake}")
}

/// A concrete persona descriptor handed to an engine or realtime session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub kind: PersonaKind,
    pub instructions: String,
    /// Advertised to other personas that can hand off to this one.
    pub handoff_description: Option<String>,
    /// Forward handoff targets. The interview persona has exactly one.
    pub handoffs: Vec<Persona>,
}

impl Persona {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Build the concierge persona.
    pub fn concierge(instructions: &str) -> Self {
        Self {
            kind: PersonaKind::Concierge,
            instructions: format!("{HANDOFF_PROMPT_PREFIX}\n{instructions}"),
            handoff_description: Some(CONCIERGE_HANDOFF_DESCRIPTION.to_string()),
            handoffs: Vec::new(),
        }
    }

    /// Build the interview persona with `concierge` as its sole handoff target.
    pub fn interview(instructions: &str, concierge: Persona) -> Self {
        Self {
            kind: PersonaKind::Interview,
            instructions: instructions.to_string(),
            handoff_description: None,
            handoffs: vec![concierge],
        }
    }

    /// Function tool declarations for every handoff target.
    pub fn handoff_tools(&self) -> Vec<serde_json::Value> {
        self.handoffs
            .iter()
            .map(|target| {
                serde_json::json!({
                    "type": "function",
                    "name": handoff_tool_name(target.name()),
                    "description": target.handoff_description.clone().unwrap_or_default(),
                    "parameters": {
                        "type": "object",
                        "properties": {},
                        "additionalProperties": false
                    }
                })
            })
            .collect()
    }

    /// Find the handoff target whose tool name matches `tool_name`.
    pub fn handoff_for_tool(&self, tool_name: &str) -> Option<&Persona> {
        self.handoffs
            .iter()
            .find(|target| handoff_tool_name(target.name()) == tool_name)
    }
}

/// Build the interview entry persona (which embeds the concierge) from config.
pub fn build_personas(prompts: &PromptConfig) -> Persona {
    let concierge = Persona::concierge(&prompts.concierge);
    Persona::interview(&prompts.interview, concierge)
}
