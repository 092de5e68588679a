//! Error types for the gift concierge.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the underlying chat engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No authenticated user. Please log in to continue.")]
    AuthenticationRequired,

    #[error("Engine request failed: {reason}")]
    InvocationFailed { reason: String },

    #[error("Invalid response from engine: {reason}")]
    InvalidResponse { reason: String },

    #[error("Unexpected engine failure: {0}")]
    Unknown(String),
}

/// Errors from the realtime transport and the credential fetch in front of it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No authenticated user; cannot mint a realtime credential")]
    AuthenticationRequired,

    #[error("Failed to fetch realtime credential: {reason}")]
    CredentialFetchFailed { reason: String },

    #[error("Realtime connect failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Failed to send realtime event: {reason}")]
    SendFailed { reason: String },

    #[error("Realtime transport is closed")]
    Closed,
}

/// Coarse failure classification recorded in operator logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AuthenticationRequired,
    EngineInvocationFailed,
    TransportConnectFailed,
    Unknown,
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationRequired => FailureKind::AuthenticationRequired,
            Self::InvocationFailed { .. } | Self::InvalidResponse { .. } => {
                FailureKind::EngineInvocationFailed
            }
            Self::Unknown(_) => FailureKind::Unknown,
        }
    }
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationRequired => FailureKind::AuthenticationRequired,
            Self::CredentialFetchFailed { .. } | Self::ConnectFailed { .. } => {
                FailureKind::TransportConnectFailed
            }
            Self::SendFailed { .. } | Self::Closed => FailureKind::Unknown,
        }
    }
}
