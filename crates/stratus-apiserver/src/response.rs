//! Response helpers shared by the resource handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Serialize `body` as the 200 response.
pub fn json_ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Serialize `body` as the 201 response for a freshly created resource.
pub fn json_created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

/// A success `Status` object, for operations with no resource body to return
/// (deletes, the binding subresource).
pub fn status_ok(message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Success",
            "code": 200,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(json_ok(serde_json::json!({})).status(), StatusCode::OK);
        assert_eq!(
            json_created(serde_json::json!({})).status(),
            StatusCode::CREATED
        );
        assert_eq!(status_ok("done").status(), StatusCode::OK);
    }
}
