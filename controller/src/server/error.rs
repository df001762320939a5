//! Mapping of controller errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::errors::FleetError;

pub fn status_code(err: &FleetError) -> StatusCode {
    match err {
        FleetError::Validation(_) => StatusCode::BAD_REQUEST,
        FleetError::Permission(_) => StatusCode::FORBIDDEN,
        FleetError::NotFound(_) => StatusCode::NOT_FOUND,
        FleetError::Conflict(_) => StatusCode::CONFLICT,
        FleetError::FeatureDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        FleetError::Auth(_) | FleetError::Transport { .. } | FleetError::Protocol(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Plain-text reason shown to the caller
pub fn reason(err: &FleetError) -> String {
    match err {
        FleetError::Validation(msg)
        | FleetError::Permission(msg)
        | FleetError::NotFound(msg)
        | FleetError::Conflict(msg)
        | FleetError::FeatureDisabled(msg)
        | FleetError::Auth(msg)
        | FleetError::Protocol(msg) => msg.clone(),
        FleetError::Transport { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", self);
        }
        (status, reason(&self)).into_response()
    }
}
