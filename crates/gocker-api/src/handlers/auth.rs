//! Authentication API handlers
//!
//! Provides HTTP endpoints for registration, login, token refresh, logout
//! and the caller's profile.

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{AuthError, AuthenticateRequest, AuthenticatedUser, RefreshRequest, RegisterRequest};
use crate::error::{ApiSuccess, AppError};
use crate::handlers::users::UserResponse;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Access and refresh token pair
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthenticationResponse {
    pub token: String,
    #[serde(rename = "refresh-token")]
    pub refresh_token: String,
}

/// Newly issued access token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Register a new user account
///
/// New users get the admin role only when their email equals `ADMIN_EMAIL`.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthenticationResponse),
        (status = 400, description = "Invalid input", body = [ApiError]),
        (status = 409, description = "Email already registered", body = ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let email = request.email.clone();

    match state.auth.register(request).await {
        Ok((user, pair)) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                email: user.email.clone(),
                role: user.role.to_string(),
                ip_address: extract_ip_address(&headers),
                user_agent: extract_user_agent(&headers),
            });

            Ok((
                StatusCode::CREATED,
                Json(AuthenticationResponse {
                    token: pair.access.value,
                    refresh_token: pair.refresh.value,
                }),
            ))
        }
        Err(err) => {
            if !matches!(err, AuthError::Validation(_)) {
                audit_log(&AuditEvent::RegistrationFailure {
                    email,
                    reason: err.to_string(),
                    ip_address: extract_ip_address(&headers),
                    user_agent: extract_user_agent(&headers),
                });
            }
            Err(err.into())
        }
    }
}

/// Login with email and password
///
/// Under the single session policy every token issued earlier to the user
/// stops working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/authenticate",
    tag = "auth",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthenticationResponse),
        (status = 400, description = "Invalid input or wrong password", body = ApiError),
        (status = 404, description = "Unknown email", body = ApiError),
    )
)]
pub async fn authenticate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let email = request.email.clone();

    match state.auth.authenticate(request).await {
        Ok((user, pair, revoked_tokens)) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: user.id,
                email: user.email,
                revoked_tokens,
                ip_address: extract_ip_address(&headers),
                user_agent: extract_user_agent(&headers),
            });

            Ok(Json(AuthenticationResponse {
                token: pair.access.value,
                refresh_token: pair.refresh.value,
            }))
        }
        Err(err) => {
            if matches!(err, AuthError::NotFound(_) | AuthError::WrongCredential) {
                audit_log(&AuditEvent::LoginFailure {
                    email,
                    reason: err.to_string(),
                    ip_address: extract_ip_address(&headers),
                    user_agent: extract_user_agent(&headers),
                });
            }
            Err(err.into())
        }
    }
}

/// Refresh access token
///
/// Exchanges a stored refresh token for a new access token. The refresh
/// token stays valid.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh-token",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 201, description = "New access token", body = TokenResponse),
        (status = 403, description = "Refresh token invalid, expired or revoked", body = ApiError),
        (status = 404, description = "User or access record missing", body = ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let (user, access) = state.auth.refresh(request).await?;

    audit_log(&AuditEvent::TokenRefresh {
        user_id: user.id,
        email: user.email,
        ip_address: extract_ip_address(&headers),
    });

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token: access.value,
        }),
    ))
}

/// Logout
///
/// Revokes every token of the caller, on all devices.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = ApiSuccess),
        (status = 403, description = "Missing or invalid token", body = ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let revoked_tokens = state.auth.logout(user.user_id).await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.user_id,
        email: user.email,
        revoked_tokens,
        ip_address: extract_ip_address(&headers),
    });

    Ok(Json(ApiSuccess::new("Logged out successfully.")))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserResponse),
        (status = 403, description = "Missing or invalid token", body = ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .users
        .find_user_by_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(profile)))
}
