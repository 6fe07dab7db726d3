//! Bearer-token-refresh strategy: a client-credentials exchange whose
//! result becomes the default bearer for subsequent calls.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpAuth;

/// Client-credentials payload sent to a token refresh endpoint.
///
/// The three secret fields come from the caller's secure configuration
/// store; this type never persists them.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenPayload {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub extra_client_secret: String,
}

impl std::fmt::Debug for TokenPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPayload")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("extra_client_secret", &"<redacted>")
            .finish()
    }
}

impl TokenPayload {
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        extra_client_secret: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: String::from("client_credentials"),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            extra_client_secret: extra_client_secret.into(),
        }
    }
}

/// Successful refresh response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The shared current-token slot.
///
/// Single-writer: only a successful refresh stores a new value. Readers
/// always observe the latest successfully-refreshed token; a failed
/// refresh leaves the previous token in place.
#[derive(Debug, Default)]
pub struct TokenManager {
    token: RwLock<Option<String>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }

    /// Store a freshly refreshed token. Callers must only invoke this on
    /// a successful refresh.
    pub fn store(&self, token: impl Into<String>) {
        *self.token.write().unwrap() = Some(token.into());
    }

    pub fn auth(&self) -> HttpAuth {
        match self.current() {
            Some(token) => HttpAuth::BearerToken(token),
            None => HttpAuth::None,
        }
    }
}
