//! API route definitions

use crate::auth::middleware::access_gate;
use crate::handlers::{auth, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes, all behind the access gate.
///
/// Paths are absolute because the gate matches on the full request path.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Public auth endpoints (let through by the gate)
        .route("/api/v1/auth/register", post(auth::register_handler))
        .route("/api/v1/auth/authenticate", post(auth::authenticate_handler))
        .route("/api/v1/auth/refresh-token", post(auth::refresh_handler))
        // Session endpoints
        .route("/api/v1/auth/logout", post(auth::logout_handler))
        .route("/api/v1/auth/me", get(auth::me_handler))
        // User resource
        .route("/api/v1/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/v1/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state, access_gate))
}
