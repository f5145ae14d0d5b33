//! Gocker API - REST server for users and tokens
//!
//! Every route under `/api/v1` passes through the access gate, which
//! admits the three public auth endpoints and otherwise requires a live
//! bearer token.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::register_handler,
        handlers::auth::authenticate_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::me_handler,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::AuthenticateRequest,
        auth::RefreshRequest,
        handlers::auth::AuthenticationResponse,
        handlers::auth::TokenResponse,
        handlers::users::UserResponse,
        handlers::users::UpdateUserRequest,
        handlers::health::HealthResponse,
        error::ApiError,
        error::ApiSuccess,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and token refresh"),
        (name = "users", description = "User resource"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// State over an in-memory store with cheap password hashing
#[cfg(any(test, feature = "test-utils"))]
pub fn test_state(config: gocker_core::AppConfig) -> Arc<AppState> {
    let state = AppState::in_memory(config, &auth::PasswordConfig::minimal())
        .unwrap_or_else(|e| panic!("invalid test configuration: {e}"));
    Arc::new(state)
}

/// Default configuration for tests: fixed secret, `admin@example.com` as admin
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config() -> gocker_core::AppConfig {
    let mut config = gocker_core::AppConfig::default();
    config.auth.secret_key = "test-secret-key".to_string();
    config.auth.admin_email = Some("admin@example.com".to_string());
    config
}

/// Router over a fresh in-memory store
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(test_state(test_config()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json["paths"]["/api/v1/auth/register"].is_object());
        assert!(json["paths"]["/api/v1/users/{id}"]["delete"].is_object());
        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        let _ = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
    }
}
