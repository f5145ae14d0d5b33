//! Gocker Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the gocker API:
//! - User and token records
//! - Common error types
//! - Repository traits for user and token persistence
//! - Configuration management
//! - Storage backends (PostgreSQL, in-memory)

pub mod config;
pub mod memory;
pub mod storage;

pub use config::{AppConfig, AuthConfig, ConfigError, PasswordScheme, SessionPolicy};
pub use memory::InMemoryStore;
pub use storage::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for storage and domain operations
#[derive(Error, Debug)]
pub enum GockerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GockerError>;

// ============================================================================
// Users
// ============================================================================

/// User role
///
/// Decided once at creation and never changed afterwards:
/// - Admin: may call mutating methods on every resource
/// - Standard: read-only access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Standard,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Standard => "standard",
        }
    }

    /// Role for a newly created account.
    ///
    /// Only an exact (case-sensitive) match against the configured
    /// administrator address grants `Admin`.
    pub fn for_new_account(email: &str, admin_email: Option<&str>) -> Self {
        match admin_email {
            Some(admin) if !admin.is_empty() && admin == email => UserRole::Admin,
            _ => UserRole::Standard,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = GockerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "standard" => Ok(UserRole::Standard),
            other => Err(GockerError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

/// Stored user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Identifier assigned by the storage backend
    pub id: i64,
    /// Display name
    pub name: String,
    /// Unique email address (matched case-insensitively)
    pub email: String,
    /// Protected credential secret, never serialized
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User to be inserted; the backend assigns the id
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

/// Stored form of an email address. Applied before every create, update
/// and lookup so that both backends compare the same string.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_string()
}

/// Case-insensitive, exact email comparison.
///
/// Folds case the way the Postgres `LOWER(email)` index does; callers pass
/// addresses already run through [`normalize_email`].
pub fn emails_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

// ============================================================================
// Tokens
// ============================================================================

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenKind {
    type Err = GockerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(GockerError::ValidationError(format!(
                "unknown token kind: {other}"
            ))),
        }
    }
}

/// Issued token record
///
/// Only the encoded value and its kind are persisted; claims are
/// re-derived from the value on every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub value: String,
    pub user_id: i64,
    pub kind: TokenKind,
    /// On refresh records, the access record issued in the same pair.
    /// Cleared when that access record is deleted.
    pub access_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Token to be inserted
#[derive(Debug, Clone)]
pub struct NewToken {
    pub value: String,
    pub user_id: i64,
    pub kind: TokenKind,
    pub access_id: Option<i64>,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Persistence for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, failing with `DuplicateEmail` if the address is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Case-insensitive exact lookup
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Persist name, email and password of an existing user
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Delete a user together with all of its tokens.
    /// Returns false if no such user exists.
    async fn delete_user(&self, id: i64) -> Result<bool>;
}

/// Persistence for issued tokens
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_token(&self, token: NewToken) -> Result<Token>;

    async fn find_token_by_id(&self, id: i64) -> Result<Option<Token>>;

    /// Exact match on the encoded value
    async fn find_token_by_value(&self, value: &str) -> Result<Option<Token>>;

    /// Most recently created token of `kind` for the user
    async fn find_token_by_user_and_kind(
        &self,
        user_id: i64,
        kind: TokenKind,
    ) -> Result<Option<Token>>;

    async fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>>;

    async fn update_token_value(&self, id: i64, value: &str) -> Result<()>;

    async fn delete_token(&self, id: i64) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
