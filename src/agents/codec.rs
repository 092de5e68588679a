//! Conversation history → engine input items.

use serde::{Deserialize, Serialize};

use super::persona::PersonaKind;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in the orchestrator's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub agent: PersonaKind,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>, agent: PersonaKind) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            agent,
        }
    }

    pub fn user(content: impl Into<String>, agent: PersonaKind) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent,
        }
    }

    pub fn assistant(content: impl Into<String>, agent: PersonaKind) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent,
        }
    }
}

/// Status of a prior assistant message. Only completed output is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Completed,
}

/// A content block of a completed assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText { text: String },
}

/// A message item in the engine's input shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum InputMessage {
    User {
        content: String,
    },
    Assistant {
        status: MessageStatus,
        content: Vec<OutputContent>,
    },
}

/// One engine input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message(InputMessage),
}

impl InputItem {
    pub fn user(text: &str) -> Self {
        Self::Message(InputMessage::User {
            content: text.to_string(),
        })
    }

    pub fn completed_assistant(text: &str) -> Self {
        Self::Message(InputMessage::Assistant {
            status: MessageStatus::Completed,
            content: vec![OutputContent::OutputText {
                text: text.to_string(),
            }],
        })
    }
}

/// Render history into engine input.
///
/// System turns live in persona instructions, so they are dropped here.
/// Relative order of the remaining turns is preserved.
pub fn render_items(history: &[ConversationTurn]) -> Vec<InputItem> {
    history
        .iter()
        .filter_map(|turn| match turn.role {
            Role::System => None,
            Role::User => Some(InputItem::user(&turn.content)),
            Role::Assistant => Some(InputItem::completed_assistant(&turn.content)),
        })
        .collect()
}
