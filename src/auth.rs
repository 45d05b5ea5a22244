//! # Authentication
//!
//! Federated sign-in itself happens at an external identity provider; this
//! side only turns a bearer token into a signed-in [`Actor`]. The provider
//! sits behind a trait so handlers and tests never care which one is
//! wired in.
use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::warn;

use crate::{error::AppError, models::Actor};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a bearer token to a signed-in user, or None.
    async fn verify(&self, token: &str) -> Option<Actor>;
}

/// Token table loaded from a JSON file, for local runs and tests.
pub struct TokenTableAuth {
    tokens: HashMap<String, Actor>,
}

impl TokenTableAuth {
    pub fn new(tokens: HashMap<String, Actor>) -> Self {
        Self { tokens }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    pub fn from_file(path: &str) -> Self {
        let tokens = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| {
                warn!("No usable auth token table at {path}, starting with none");
                HashMap::new()
            });

        Self::new(tokens)
    }
}

#[async_trait]
impl AuthProvider for TokenTableAuth {
    async fn verify(&self, token: &str) -> Option<Actor> {
        self.tokens.get(token).cloned()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// The signed-in user for this request, if any.
pub async fn actor_from_headers(provider: &dyn AuthProvider, headers: &HeaderMap) -> Option<Actor> {
    let token = bearer_token(headers)?;
    provider.verify(token).await
}

/// Like [`actor_from_headers`] but for operations that require sign-in.
pub async fn require_actor(
    provider: &dyn AuthProvider,
    headers: &HeaderMap,
) -> Result<Actor, AppError> {
    actor_from_headers(provider, headers)
        .await
        .ok_or(AppError::AuthenticationRequired)
}
