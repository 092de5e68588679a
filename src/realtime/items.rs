//! Realtime history items and their projection into chat messages.

use serde::{Deserialize, Serialize};

use crate::agents::codec::Role;

/// One opaque item of realtime conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealtimeItem(pub serde_json::Value);

impl RealtimeItem {
    /// Item id, whichever spelling the producer used.
    pub fn id(&self) -> Option<&str> {
        ["itemId", "item_id", "id"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(serde_json::Value::as_str))
    }
}

impl From<serde_json::Value> for RealtimeItem {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A flattened message as shown to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

/// What an observer sees of the voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceView {
    pub loading: bool,
    pub messages: Vec<VoiceMessage>,
}

impl VoiceView {
    /// Initial view before a session is available.
    pub fn loading() -> Self {
        Self {
            loading: true,
            messages: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct MessageShape {
    #[serde(rename = "type")]
    kind: String,
    role: Role,
    #[serde(default)]
    content: Option<Vec<Fragment>>,
}

#[derive(Deserialize)]
struct Fragment {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

impl Fragment {
    fn into_text(self) -> Option<String> {
        self.text
            .filter(|t| !t.is_empty())
            .or(self.transcript)
            .filter(|t| !t.is_empty())
    }
}

/// Decode one item as a message, or `None` if it is not message-shaped.
pub fn as_message(item: &RealtimeItem) -> Option<VoiceMessage> {
    let id = item.id()?.to_string();
    let shape: MessageShape = serde_json::from_value(item.0.clone()).ok()?;
    if shape.kind != "message" {
        return None;
    }

    let content = shape
        .content
        .unwrap_or_default()
        .into_iter()
        .filter_map(Fragment::into_text)
        .collect::<Vec<_>>()
        .join(" ");

    Some(VoiceMessage {
        id,
        role: shape.role,
        content,
    })
}

/// Keep message-shaped items and flatten their text, in order.
pub fn project_messages(items: &[RealtimeItem]) -> Vec<VoiceMessage> {
    items.iter().filter_map(as_message).collect()
}
