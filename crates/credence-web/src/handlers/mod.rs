//! HTTP handlers.

pub mod graph;
pub mod system;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use credence_common::CredenceError;

/// Error payload in the FastAPI-compatible `{"detail": ...}` shape the
/// original consumers expect.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_GATEWAY, message: message.into() }
    }
}

impl From<CredenceError> for ApiError {
    fn from(e: CredenceError) -> Self {
        let status = match &e {
            CredenceError::Validation(_) => StatusCode::BAD_REQUEST,
            CredenceError::Upstream(_) | CredenceError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({"detail": self.message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let e = ApiError::from(CredenceError::Validation("worldview is required".to_string()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_maps_to_bad_gateway() {
        let e = ApiError::from(CredenceError::Upstream("API down".to_string()));
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_structural_maps_to_internal() {
        let e = ApiError::from(CredenceError::Structural("no nodes".to_string()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
