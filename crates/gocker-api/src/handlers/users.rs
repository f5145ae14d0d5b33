//! User resource handlers
//!
//! Reads are open to any authenticated caller; the access gate restricts
//! create, update and delete to admins.

use crate::audit::{audit_log, AuditEvent};
use crate::auth::{validate_request, AuthError, RegisterRequest};
use crate::error::{ApiSuccess, AppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use gocker_core::{emails_match, normalize_email, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Public view of a user; the protected password never leaves the server
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub first_name: String,
    pub email: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.name,
            email: user.email,
            role: user.role.to_string(),
        }
    }
}

/// Partial profile update; absent or empty fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UpdateUserRequest {
    fn normalized(self) -> Self {
        let present = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            first_name: present(self.first_name),
            email: present(self.email.map(|email| normalize_email(&email))),
            password: present(self.password),
        }
    }
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("Id parameter must be a number.".to_string()))
}

async fn find_user(state: &AppState, id: i64) -> Result<User, AppError> {
    state
        .users
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// List all users
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Missing or invalid token", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list_users().await?;
    let body: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(body))
}

/// Create a user without issuing tokens
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input", body = [ApiError]),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let user = state.auth.create_account(request).await?;

    tracing::info!(user_id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 400, description = "Id is not a number", body = ApiError),
        (status = 404, description = "No such user", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let user = find_user(&state, id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Update name, email or password of a user
///
/// Changing the email revokes the user's tokens, since their claims name
/// the old address.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 404, description = "No such user", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut user = find_user(&state, id).await?;
    let Json(request) = payload?;
    let request = request.normalized();
    validate_request(&request)?;

    let mut email_changed = false;
    if let Some(name) = request.first_name {
        user.name = name;
    }
    if let Some(email) = request.email {
        email_changed = !emails_match(&user.email, &email);
        user.email = email;
    }
    if let Some(password) = request.password {
        user.password = state.guard.protect(&password).map_err(AuthError::from)?;
    }

    state.users.update_user(&user).await?;

    if email_changed {
        let revoked_tokens = state.auth.revoke_all(user.id).await?;
        audit_log(&AuditEvent::SessionsRevoked {
            user_id: user.id,
            reason: "email changed".to_string(),
            revoked_tokens,
        });
    }

    Ok(Json(UserResponse::from(user)))
}

/// Delete a user together with all of its tokens
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = ApiSuccess),
        (status = 400, description = "Id is not a number", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "No such user", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;

    if !state.users.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = id, "user deleted");
    Ok(Json(ApiSuccess::new("User successfully deleted.")))
}
