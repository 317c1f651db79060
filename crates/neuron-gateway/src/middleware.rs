use async_trait::async_trait;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use neuron_core::{NeuronError, NeuronResult};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Maps a credential to a stable user id.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `credential` is the presented secret, `claimed_user` the user id the
    /// client asserted. Returns the user id the request acts as.
    async fn authenticate(
        &self,
        credential: Option<&str>,
        claimed_user: Option<&str>,
    ) -> NeuronResult<String>;
}

/// API keys mapped to user ids.
///
/// With no keys configured every request is trusted and acts as the user id
/// it claims. That mode is meant for local development only.
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    /// Maps each API key to a user id. An empty map disables authentication.
    pub fn new(keys: HashMap<String, String>) -> Self {
        if keys.is_empty() {
            warn!("No API keys configured, accepting client-supplied user ids");
        }
        Self { keys }
    }

    /// Returns true if at least one key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(
        &self,
        credential: Option<&str>,
        claimed_user: Option<&str>,
    ) -> NeuronResult<String> {
        if !self.is_enabled() {
            return match claimed_user.filter(|u| !u.is_empty()) {
                Some(user) => Ok(user.to_string()),
                None => Err(NeuronError::Auth("user_id is required".to_string())),
            };
        }

        match credential {
            Some(key) => self.keys.get(key).cloned().ok_or_else(|| {
                warn!("Rejected request: invalid API key");
                NeuronError::Auth("invalid API key".to_string())
            }),
            None => {
                warn!("Rejected request: missing API key");
                Err(NeuronError::Auth("API key required".to_string()))
            }
        }
    }
}

/// Identity parameters accepted on the query string.
#[derive(Debug, Deserialize, Default)]
pub struct IdentityQuery {
    /// API key, for clients that cannot set headers.
    pub api_key: Option<String>,
    /// Claimed user id. Only trusted when authentication is disabled.
    pub user_id: Option<String>,
    /// Session to join.
    pub session_id: Option<String>,
}

impl IdentityQuery {
    /// The session id, if present and non-empty.
    pub fn session(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// The presented credential: `Authorization: Bearer <key>` first, then
/// `?api_key=<key>`.
pub fn credential<'a>(headers: &'a HeaderMap, query: &'a IdentityQuery) -> Option<&'a str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or(query.api_key.as_deref())
}

/// JSON error body with a status derived from the error kind.
pub fn error_response(err: &NeuronError) -> Response {
    let status = match err {
        NeuronError::Auth(_) => StatusCode::UNAUTHORIZED,
        NeuronError::Transport(_) | NeuronError::Serialization(_) => StatusCode::BAD_REQUEST,
        NeuronError::ServerBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::json!({
        "error": { "code": err.code(), "message": err.to_string() }
    });
    (status, Json(body)).into_response()
}
