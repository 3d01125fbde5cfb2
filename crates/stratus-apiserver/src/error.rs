use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by the resource handlers. Each variant maps onto the HTTP
/// status a Kubernetes-style API answers with.
#[derive(Debug)]
pub enum ApiError {
    /// No resource under the requested key
    NotFound(String),

    /// A create raced an existing resource
    AlreadyExists(String),

    /// The request contradicts current state, e.g. binding a bound pod
    Conflict(String),

    /// The request body or parameters are malformed
    BadRequest(String),

    /// Everything the handlers cannot blame on the caller
    Internal(String),

    /// The resource was well-formed but failed validation
    ValidationFailed(String),
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn into_message(self) -> String {
        match self {
            ApiError::NotFound(m)
            | ApiError::AlreadyExists(m)
            | ApiError::Conflict(m)
            | ApiError::BadRequest(m)
            | ApiError::Internal(m)
            | ApiError::ValidationFailed(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    /// Failures leave the server as Kubernetes `Status` objects.
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "code": status.as_u16(),
            "message": self.into_message(),
        }));

        (status, body).into_response()
    }
}

impl From<stratus_core::ResourceError> for ApiError {
    fn from(err: stratus_core::ResourceError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

// Serde failures in the handlers come from re-reading stored objects, not from
// request bodies (those are rejected by the Json extractor), so they are ours.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("serialization failed: {}", err))
    }
}
