//! Authentication and authorization module
//!
//! This module provides token-based authentication with the following components:
//! - Token encoding and validation (`jwt`)
//! - Password protection with Argon2id or ChaCha20-Poly1305 (`password`)
//! - Issued-token persistence adapter (`store`)
//! - Registration, login, refresh and logout (`service`)
//! - The request gate that enforces all of the above (`middleware`)

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod store;

pub use jwt::{Claims, JwtError, TokenCodec};
pub use middleware::{access_gate, AuthenticatedUser, Denial};
pub use password::{guard_for, Argon2Guard, CipherGuard, PasswordConfig, PasswordError, PasswordGuard};
pub use service::{
    AuthenticateRequest, RefreshRequest, RegisterRequest, TokenPair, TokenService,
};
pub use store::TokenStore;

use gocker_core::GockerError;
use thiserror::Error;
use validator::Validate;

/// Errors surfaced by the authentication service
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("request validation failed")]
    Validation(Vec<String>),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("{0} not found")]
    NotFound(String),

    #[error("wrong password. Please, try again")]
    WrongCredential,

    #[error("token not valid")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GockerError> for AuthError {
    fn from(err: GockerError) -> Self {
        match err {
            GockerError::NotFound(what) => AuthError::NotFound(what),
            GockerError::DuplicateEmail => AuthError::DuplicateEmail,
            GockerError::ValidationError(msg) => AuthError::Validation(vec![msg]),
            GockerError::ConfigError(msg) => AuthError::Configuration(msg),
            GockerError::DatabaseError(msg) => AuthError::Internal(msg),
            GockerError::Other(err) => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::Expired,
            JwtError::Malformed | JwtError::SignatureInvalid => AuthError::InvalidToken,
            JwtError::Configuration(msg) => AuthError::Configuration(msg),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::WrongCredential => AuthError::WrongCredential,
            PasswordError::Configuration(msg) => AuthError::Configuration(msg),
            PasswordError::InvalidSecret | PasswordError::HashingFailed(_) => {
                AuthError::Internal(err.to_string())
            }
        }
    }
}

/// Run derived validation and flatten failures into `Field <name> <message>` lines
pub fn validate_request<T: Validate>(request: &T) -> Result<(), AuthError> {
    request.validate().map_err(|errors| {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, failures)| {
                failures.iter().map(move |failure| {
                    let message = failure.message.as_deref().unwrap_or("is invalid");
                    format!("Field {field} {message}")
                })
            })
            .collect();
        messages.sort();
        messages.dedup();
        AuthError::Validation(messages)
    })
}
