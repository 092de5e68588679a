//! Text conversation flow: personas, history codec, handoff detection and
//! the orchestrator that ties them to the chat engine.

pub mod codec;
pub mod engine;
pub mod handoff;
pub mod orchestrator;
pub mod persona;
pub mod prompts;

pub use codec::{ConversationTurn, InputItem, Role, render_items};
pub use engine::{ChatEngine, EngineOutput, ResponsesEngine};
pub use handoff::{ExecutionTrace, TraceEvent, detect_handoff};
pub use orchestrator::{AgentOrchestrator, OrchestrationResult};
pub use persona::{Persona, PersonaKind, build_personas};
