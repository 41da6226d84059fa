//! HTTP-facing error responses.
//!
//! # Responsibilities
//! - Map guard rejections to status codes
//! - Render every rejection as a JSON body clients can parse
//!
//! # Design Decisions
//! - Internal failures never carry detail to the client; the detail is logged
//! - Validation failures list every field error, not just the first

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::validation::upload::FileRejection;
use crate::validation::ValidationErrors;

/// A request rejected by the guard.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed with {} field error(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("invalid input detected")]
    SuspiciousInput,

    #[error("invalid JSON format")]
    InvalidJson,

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("nesting depth exceeds {max_depth}")]
    TooDeep { max_depth: usize },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    #[error("file rejected: {0}")]
    FileRejected(#[from] FileRejection),

    #[error("internal validation error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::SuspiciousInput
            | ApiError::InvalidJson
            | ApiError::TooDeep { .. }
            | ApiError::FileRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!({
                "message": "Validation failed",
                "errors": errors,
            }),
            ApiError::SuspiciousInput => json!({
                "error": "Invalid input detected",
                "message": "Request contains potentially malicious content",
            }),
            ApiError::InvalidJson => json!({
                "error": "Invalid JSON format",
                "message": "Request body contains malformed JSON",
            }),
            ApiError::PayloadTooLarge { limit } => json!({
                "error": "Payload Too Large",
                "message": format!("Request body must not exceed {limit} bytes"),
            }),
            ApiError::TooDeep { max_depth } => json!({
                "error": "Invalid input detected",
                "message": format!("Request nesting exceeds {max_depth} levels"),
            }),
            ApiError::RateLimited {
                message,
                retry_after_secs,
            } => json!({
                "error": "Too Many Requests",
                "message": message,
                "retryAfter": retry_after_secs,
            }),
            ApiError::FileRejected(rejection) => json!({
                "error": "Invalid file",
                "message": rejection.to_string(),
            }),
            ApiError::Internal => json!({ "message": "Internal validation error" }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_lists_fields() {
        let errors = ValidationErrors::from(vec![
            FieldError::new("email", "\"email\" is required", serde_json::Value::Null),
            FieldError::new("password", "\"password\" is required", serde_json::Value::Null),
        ]);
        let response = ApiError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
        assert_eq!(body["errors"][1]["field"], "password");
    }

    #[tokio::test]
    async fn test_rate_limited_body() {
        let response = ApiError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["retryAfter"], 42);
    }

    #[tokio::test]
    async fn test_internal_error_is_opaque() {
        let response = ApiError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "message": "Internal validation error" }));
    }
}
