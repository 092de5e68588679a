//! Gift concierge: a two-persona conversation core and a shared realtime
//! voice session.

pub mod agents;
pub mod auth;
pub mod config;
pub mod error;
pub mod realtime;
pub mod server;
