//! API error handling

use crate::auth::AuthError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gocker_core::GockerError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Human-readable message
    #[serde(rename = "Error")]
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Success message response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiSuccess {
    #[serde(rename = "Success")]
    pub success: String,
}

impl ApiSuccess {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: message.into(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// One entry per failed field
    Validation(Vec<String>),
    NotFound(String),
    Conflict(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(messages) => {
                let errors: Vec<ApiError> = messages.into_iter().map(ApiError::new).collect();
                return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ApiError::new(message))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(_: JsonRejection) -> Self {
        AppError::BadRequest("not valid json.".to_string())
    }
}

impl From<GockerError> for AppError {
    fn from(err: GockerError) -> Self {
        AuthError::from(err).into()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(messages) => AppError::Validation(messages),
            AuthError::DuplicateEmail => AppError::Conflict(err.to_string()),
            AuthError::NotFound(_) => AppError::NotFound(err.to_string()),
            AuthError::WrongCredential => AppError::BadRequest(err.to_string()),
            AuthError::InvalidToken | AuthError::Expired | AuthError::Revoked => {
                AppError::Forbidden(err.to_string())
            }
            AuthError::Configuration(_) | AuthError::Internal(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::NotFound("User not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, serde_json::json!({"Error": "User not found"}));
    }

    #[tokio::test]
    async fn test_validation_body_is_array() {
        let response = AppError::Validation(vec![
            "Field email must be provided".to_string(),
            "Field password must be provided".to_string(),
        ])
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json[0]["Error"], "Field email must be provided");
        assert_eq!(json[1]["Error"], "Field password must be provided");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response = AppError::Internal("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["Error"], "internal server error");
    }

    #[test]
    fn test_auth_error_status_mapping() {
        let status = |err: AuthError| AppError::from(err).into_response().status();

        assert_eq!(status(AuthError::DuplicateEmail), StatusCode::CONFLICT);
        assert_eq!(status(AuthError::WrongCredential), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::NotFound("User".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthError::Revoked), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::Expired), StatusCode::FORBIDDEN);
        assert_eq!(
            status(AuthError::Configuration("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
