//! Authentication against the backend proxy.
//!
//! The backend holds the real provider keys. Clients authenticate to it with
//! an identity token; the backend forwards chat requests and mints short-lived
//! realtime credentials.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::TransportError;

/// HTTP client bound to the backend with a bearer identity token.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    base_url: String,
    id_token: Arc<SecretString>,
    http: reqwest::Client,
}

impl AuthenticatedClient {
    pub fn new(base_url: impl Into<String>, id_token: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            id_token: Arc::new(id_token),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start an authenticated POST to a backend path.
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(self.id_token.expose_secret())
    }

    /// Mint an ephemeral credential for a realtime session.
    pub async fn create_realtime_credential(&self) -> Result<SecretString, TransportError> {
        let resp = self.post("/sessions").send().await.map_err(|e| {
            TransportError::CredentialFetchFailed {
                reason: e.to_string(),
            }
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::CredentialFetchFailed {
                reason: e.to_string(),
            })?;
        if !status.is_success() {
            return Err(TransportError::CredentialFetchFailed {
                reason: format!("backend returned {status}: {body}"),
            });
        }

        parse_session_response(&body)
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
}

/// Pull `client_secret.value` out of a `/sessions` response body.
pub fn parse_session_response(body: &str) -> Result<SecretString, TransportError> {
    let parsed: SessionResponse =
        serde_json::from_str(body).map_err(|e| TransportError::CredentialFetchFailed {
            reason: format!("malformed session response: {e}"),
        })?;
    if parsed.client_secret.value.is_empty() {
        return Err(TransportError::CredentialFetchFailed {
            reason: "session response carried an empty client secret".to_string(),
        });
    }
    Ok(SecretString::from(parsed.client_secret.value))
}

/// Credential provider consulted before every engine invocation.
pub trait AuthProvider: Send + Sync {
    /// The authenticated client, or `None` when signed out.
    fn client(&self) -> Option<AuthenticatedClient>;

    fn is_authenticated(&self) -> bool {
        self.client().is_some()
    }
}

/// Source of ephemeral realtime credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn realtime_credential(&self) -> Result<SecretString, TransportError>;
}

/// Process auth state: signed in iff a client exists.
pub struct SessionAuth {
    base_url: String,
    client: RwLock<Option<AuthenticatedClient>>,
}

impl SessionAuth {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: RwLock::new(None),
        }
    }

    /// Sign in (or refresh) with an identity token.
    pub fn sign_in(&self, id_token: SecretString) {
        let client = AuthenticatedClient::new(self.base_url.clone(), id_token);
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        tracing::info!(backend = %self.base_url, "Signed in to backend");
    }

    pub fn sign_out(&self) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("Signed out of backend");
    }
}

impl AuthProvider for SessionAuth {
    fn client(&self) -> Option<AuthenticatedClient> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialSource for SessionAuth {
    async fn realtime_credential(&self) -> Result<SecretString, TransportError> {
        let client = self
            .client()
            .ok_or(TransportError::AuthenticationRequired)?;
        client.create_realtime_credential().await
    }
}
