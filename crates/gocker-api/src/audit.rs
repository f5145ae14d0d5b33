//! Security audit logging for authentication events
//!
//! Provides structured audit logging for registrations, logins, refreshes,
//! logouts, session revocations and access control failures.
//!
//! All audit events are logged at INFO level with the "audit" target,
//! making them easy to filter and route to security monitoring systems.
//! Events never carry passwords or token values.
//!
//! # Example
//!
//! ```ignore
//! use gocker_api::audit::{AuditEvent, audit_log};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     email: user.email.clone(),
//!     revoked_tokens: 2,
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful user registration
    RegistrationSuccess {
        user_id: i64,
        email: String,
        role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed registration attempt
    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Successful user login
    LoginSuccess {
        user_id: i64,
        email: String,
        revoked_tokens: usize,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Access token refresh
    TokenRefresh {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
    },

    /// User logout
    Logout {
        user_id: i64,
        email: String,
        revoked_tokens: usize,
        ip_address: Option<String>,
    },

    /// Tokens revoked as a side effect of an account change
    SessionsRevoked {
        user_id: i64,
        reason: String,
        revoked_tokens: usize,
    },

    /// Access denied due to insufficient permissions
    AccessDenied {
        user_id: Option<i64>,
        email: Option<String>,
        method: String,
        path: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Missing, invalid, expired or revoked token used
    InvalidToken {
        path: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::SessionsRevoked { .. } => "Sessions revoked",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }
}

/// Log a security audit event with structured fields
///
/// The event is serialized to JSON so log aggregators receive every field,
/// while the most useful ones are also recorded as tracing fields.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::RegistrationSuccess {
            user_id,
            email,
            role,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                role = %role,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
        AuditEvent::RegistrationFailure {
            email,
            reason,
            ip_address,
            ..
        }
        | AuditEvent::LoginFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
        AuditEvent::LoginSuccess {
            user_id,
            email,
            revoked_tokens,
            ip_address,
            ..
        }
        | AuditEvent::Logout {
            user_id,
            email,
            revoked_tokens,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                revoked_tokens = %revoked_tokens,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
        AuditEvent::TokenRefresh {
            user_id,
            email,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
        AuditEvent::SessionsRevoked {
            user_id,
            reason,
            revoked_tokens,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                reason = %reason,
                revoked_tokens = %revoked_tokens,
                "{}", event.summary()
            );
        }
        AuditEvent::AccessDenied {
            user_id,
            method,
            path,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = ?user_id,
                method = %method,
                path = %path,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
        AuditEvent::InvalidToken {
            path,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                path = %path,
                reason = %reason,
                ip_address = ?ip_address,
                "{}", event.summary()
            );
        }
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // first entry is the client
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
