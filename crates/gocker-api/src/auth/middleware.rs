/// Access gate for protected routes
///
/// Runs before every handler under `/api/v1`. Extracts the bearer token,
/// validates it, checks that it has not been revoked, resolves the caller
/// and applies the method-based role policy. On success the caller is added
/// to request extensions as [`AuthenticatedUser`].
use super::jwt::JwtError;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gocker_core::{GockerError, TokenKind, User, UserRole};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Routes reachable without a token
pub const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/auth/register",
    "/api/v1/auth/authenticate",
    "/api/v1/auth/refresh-token",
];

/// Mutating routes any authenticated caller may use on their own session
pub const SELF_SERVICE_PATHS: &[&str] = &["/api/v1/auth/logout"];

/// Authenticated caller, extracted in handlers with `Extension<AuthenticatedUser>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    fn new(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Why the gate refused a request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Denial {
    #[error("authorization token must be provided, starting with Bearer")]
    MissingCredential,

    #[error("token not valid")]
    InvalidToken,

    #[error("token expired. Please, get a new one at /api/v1/auth/refresh-token")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("method not allowed")]
    Forbidden,

    #[error("{0}")]
    Internal(String),
}

impl From<JwtError> for Denial {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Denial::Expired,
            JwtError::Malformed | JwtError::SignatureInvalid => Denial::InvalidToken,
            JwtError::Configuration(msg) => Denial::Internal(msg),
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        match self {
            Denial::Internal(msg) => AppError::Internal(msg).into_response(),
            denial => AppError::Forbidden(denial.to_string()).into_response(),
        }
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Method-based role policy: mutations require Admin outside self-service paths
pub fn is_permitted(role: UserRole, method: &Method, path: &str) -> bool {
    role == UserRole::Admin || !is_mutating(method) || SELF_SERVICE_PATHS.contains(&path)
}

/// Request gate applied with `middleware::from_fn_with_state`
///
/// ```ignore
/// let app = Router::new()
///     .route("/api/v1/users", get(list_users))
///     .route_layer(middleware::from_fn_with_state(state.clone(), access_gate))
///     .with_state(state);
/// ```
pub async fn access_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Denial> {
    let path = request.uri().path().to_string();
    if PUBLIC_PATHS.contains(&path.as_str()) {
        return Ok(next.run(request).await);
    }

    // Extract context for audit logging
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());
    let reject = |denial: Denial| {
        if !matches!(denial, Denial::Internal(_)) {
            audit_log(&AuditEvent::InvalidToken {
                path: path.clone(),
                reason: denial.to_string(),
                ip_address: ip_address.clone(),
                user_agent: user_agent.clone(),
            });
        }
        denial
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(Denial::MissingCredential)
        .map_err(reject)?
        .to_string();

    let claims = state
        .codec
        .decode(&token)
        .map_err(|e| reject(Denial::from(e)))?;
    if claims.kind != TokenKind::Access {
        return Err(reject(Denial::InvalidToken));
    }

    let record = match state.tokens.by_value(&token).await {
        Ok(record) => record,
        Err(GockerError::NotFound(_)) => return Err(reject(Denial::Revoked)),
        Err(e) => return Err(Denial::Internal(e.to_string())),
    };

    let user = state
        .users
        .find_user_by_email(&claims.email)
        .await
        .map_err(|e| Denial::Internal(e.to_string()))?
        .filter(|user| user.id == record.user_id)
        .ok_or_else(|| reject(Denial::Revoked))?;

    if !is_permitted(user.role, request.method(), &path) {
        audit_log(&AuditEvent::AccessDenied {
            user_id: Some(user.id),
            email: Some(user.email.clone()),
            method: request.method().to_string(),
            path: path.clone(),
            ip_address: ip_address.clone(),
            user_agent: user_agent.clone(),
        });
        return Err(Denial::Forbidden);
    }

    tracing::debug!(user_id = user.id, method = %request.method(), path = %path, "request authorized");
    request
        .extensions_mut()
        .insert(AuthenticatedUser::new(&user));

    Ok(next.run(request).await)
}
