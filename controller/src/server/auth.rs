//! Caller authorization for privileged routes

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

/// "Caller is authorized" predicate consulted by privileged handlers
pub trait CallerAuthorizer: Send + Sync {
    fn is_authorized(&self, headers: &HeaderMap) -> bool;
}

/// Requires `Authorization: Bearer <token>` when a token is configured;
/// accepts every caller otherwise.
pub struct BearerAuthorizer {
    token: Option<SecretString>,
}

impl BearerAuthorizer {
    pub fn new(token: &str) -> Self {
        let token = token.trim();
        Self {
            token: (!token.is_empty()).then(|| SecretString::from(token.to_string())),
        }
    }
}

impl CallerAuthorizer for BearerAuthorizer {
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented.trim() == expected.expose_secret())
    }
}
