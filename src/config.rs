//! Configuration types.

use std::str::FromStr;

use secrecy::SecretString;

use crate::agents::prompts::{CONCIERGE_PROMPT, INTERVIEW_PROMPT};
use crate::error::ConfigError;

/// Persona instructions (opaque to the orchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub interview: String,
    pub concierge: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            interview: INTERVIEW_PROMPT.to_string(),
            concierge: CONCIERGE_PROMPT.to_string(),
        }
    }
}

/// Audio encoding for the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm16,
    G711Ulaw,
    G711Alaw,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcm16" => Ok(Self::Pcm16),
            "g711_ulaw" => Ok(Self::G711Ulaw),
            "g711_alaw" => Ok(Self::G711Alaw),
            other => Err(format!("unknown audio format {other:?}")),
        }
    }
}

/// Realtime voice session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the realtime API.
    pub url: String,
    pub model: String,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    /// Model used for server-side transcription of user audio.
    pub transcription_model: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2025-06-03".to_string(),
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            transcription_model: "gpt-4o-mini-transcribe".to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Authenticated backend proxy.
    pub backend_url: String,
    /// Identity token to sign in with at startup.
    pub id_token: Option<SecretString>,
    pub chat_model: String,
    pub realtime: RealtimeConfig,
    pub prompts: PromptConfig,
    pub http_port: u16,
    /// Directory for rolling log files. Stderr only when unset.
    pub log_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3001".to_string(),
            id_token: None,
            chat_model: "gpt-4o".to_string(),
            realtime: RealtimeConfig::default(),
            prompts: PromptConfig::default(),
            http_port: 8080,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_port = match var("GIFT_HTTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "GIFT_HTTP_PORT".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => defaults.http_port,
        };

        let audio_format = match var("GIFT_AUDIO_FORMAT") {
            Some(raw) => raw.parse::<AudioFormat>().map_err(|message| ConfigError::InvalidValue {
                key: "GIFT_AUDIO_FORMAT".to_string(),
                message,
            })?,
            None => defaults.realtime.input_audio_format,
        };

        let realtime = RealtimeConfig {
            url: var("GIFT_REALTIME_URL").unwrap_or(defaults.realtime.url),
            model: var("GIFT_REALTIME_MODEL").unwrap_or(defaults.realtime.model),
            transcription_model: var("GIFT_TRANSCRIPTION_MODEL")
                .unwrap_or(defaults.realtime.transcription_model),
            input_audio_format: audio_format,
            output_audio_format: audio_format,
        };

        let prompts = PromptConfig {
            interview: var("GIFT_INTERVIEW_PROMPT").unwrap_or(defaults.prompts.interview),
            concierge: var("GIFT_CONCIERGE_PROMPT").unwrap_or(defaults.prompts.concierge),
        };

        Ok(Self {
            backend_url: var("GIFT_BACKEND_URL").unwrap_or(defaults.backend_url),
            id_token: var("GIFT_ID_TOKEN").map(|t| SecretString::from(t.trim().to_string())),
            chat_model: var("GIFT_CHAT_MODEL").unwrap_or(defaults.chat_model),
            realtime,
            prompts,
            http_port,
            log_dir: var("GIFT_LOG_DIR"),
        })
    }
}
