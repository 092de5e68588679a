//! Handoff detection from an engine execution trace.
//!
//! A trace is decoded leniently: anything missing or malformed reads as
//! "no events", which in turn reads as "no handoff".

use serde::{Deserialize, Serialize};

/// Substring marking a transfer tool call, e.g. `transfer_to_concierge_agent`.
pub const TRANSFER_TOOL_MARKER: &str = "transfer_to";

/// One event recorded by the engine during a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TraceEvent {
    pub fn handoff(target: &str) -> Self {
        Self {
            kind: Some("handoff".to_string()),
            name: Some(target.to_string()),
        }
    }

    pub fn tool_call(name: &str) -> Self {
        Self {
            kind: Some("tool_call".to_string()),
            name: Some(name.to_string()),
        }
    }

    /// Whether this single event signals a handoff.
    pub fn signals_handoff(&self) -> bool {
        match self.kind.as_deref() {
            Some("handoff") => true,
            Some("tool_call") => self
                .name
                .as_deref()
                .is_some_and(|name| name.contains(TRANSFER_TOOL_MARKER)),
            _ => false,
        }
    }
}

/// Engine-provided record of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<TraceEvent>>,
}

impl ExecutionTrace {
    pub fn with_events(events: Vec<TraceEvent>) -> Self {
        Self {
            events: Some(events),
        }
    }

    /// Decode a trace from untyped JSON. Returns `None` for anything that is
    /// not an object of the expected shape.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(trace) => Some(trace),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable execution trace");
                None
            }
        }
    }
}

/// Decide whether a completed turn handed control to another persona.
pub fn detect_handoff(trace: Option<&ExecutionTrace>) -> bool {
    trace
        .and_then(|t| t.events.as_deref())
        .is_some_and(|events| events.iter().any(TraceEvent::signals_handoff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_empty_traces_are_not_handoffs() {
        assert!(!detect_handoff(None));
        assert!(!detect_handoff(Some(&ExecutionTrace::default())));
        assert!(!detect_handoff(Some(&ExecutionTrace::with_events(vec![]))));
    }

    #[test]
    fn handoff_event_is_detected() {
        let trace = ExecutionTrace::with_events(vec![TraceEvent {
            kind: Some("handoff".into()),
            name: None,
        }]);
        assert!(detect_handoff(Some(&trace)));
    }

    #[test]
    fn transfer_tool_call_is_detected() {
        let trace =
            ExecutionTrace::with_events(vec![TraceEvent::tool_call("transfer_to_concierge_agent")]);
        assert!(detect_handoff(Some(&trace)));
    }

    #[test]
    fn ordinary_tool_call_is_not_a_handoff() {
        let trace = ExecutionTrace::with_events(vec![TraceEvent::tool_call("get_weather")]);
        assert!(!detect_handoff(Some(&trace)));
    }

    #[test]
    fn tool_call_without_name_is_not_a_handoff() {
        let trace = ExecutionTrace::with_events(vec![TraceEvent {
            kind: Some("tool_call".into()),
            name: None,
        }]);
        assert!(!detect_handoff(Some(&trace)));
    }

    #[test]
    fn qualifying_event_anywhere_in_list() {
        let trace = ExecutionTrace::with_events(vec![
            TraceEvent::tool_call("get_weather"),
            TraceEvent::default(),
            TraceEvent::tool_call("transfer_to_concierge_agent_v2"),
        ]);
        assert!(detect_handoff(Some(&trace)));
    }

    #[test]
    fn decodes_from_json() {
        let trace = ExecutionTrace::from_value(&json!({
            "events": [{"type": "tool_call", "name": "transfer_to_concierge_agent"}],
            "spans": 3
        }));
        assert!(detect_handoff(trace.as_ref()));

        let empty = ExecutionTrace::from_value(&json!({})).unwrap();
        assert!(empty.events.is_none());
        assert!(!detect_handoff(Some(&empty)));
    }

    #[test]
    fn malformed_json_fails_open() {
        assert!(ExecutionTrace::from_value(&json!("not a trace")).is_none());
        assert!(ExecutionTrace::from_value(&json!({"events": 7})).is_none());
        assert!(!detect_handoff(
            ExecutionTrace::from_value(&json!({"events": 7})).as_ref()
        ));
    }
}
