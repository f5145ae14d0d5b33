//! PostgreSQL storage backend
//!
//! Provides user and token persistence using SQLx and PostgreSQL.
//! Tokens reference their owner with `ON DELETE CASCADE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use crate::{
    GockerError, NewToken, NewUser, Result, Token, TokenKind, TokenRepository, User,
    UserRepository,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        password TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (LOWER(email))",
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        id BIGSERIAL PRIMARY KEY,
        value TEXT NOT NULL,
        user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "ALTER TABLE tokens ADD COLUMN IF NOT EXISTS access_id BIGINT REFERENCES tokens (id) ON DELETE SET NULL",
    "CREATE INDEX IF NOT EXISTS tokens_value_idx ON tokens (value)",
    "CREATE INDEX IF NOT EXISTS tokens_user_kind_idx ON tokens (user_id, kind)",
];

/// PostgreSQL user and token store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| GockerError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| GockerError::DatabaseError(format!("Schema setup failed: {e}")))?;
        }
        tracing::debug!("database schema ready");
        Ok(())
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = GockerError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password: row.password,
            role: row.role.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Token row from database
#[derive(Debug, FromRow)]
struct TokenRow {
    id: i64,
    value: String,
    user_id: i64,
    kind: String,
    access_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for Token {
    type Error = GockerError;

    fn try_from(row: TokenRow) -> Result<Self> {
        Ok(Token {
            id: row.id,
            value: row.value,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            access_id: row.access_id,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (name, email, password, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password, role, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GockerError::DuplicateEmail
            } else {
                GockerError::DatabaseError(format!("Failed to create user: {e}"))
            }
        })?;

        row.try_into()
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, password, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, email, password, role, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, name, email, password, role, created_at, updated_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to list users: {e}")))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                name = $2,
                email = $3,
                password = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GockerError::DuplicateEmail
            } else {
                GockerError::DatabaseError(format!("Failed to update user: {e}"))
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(GockerError::NotFound("User".to_string()));
        }

        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| GockerError::DatabaseError(format!("Failed to delete user: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn insert_token(&self, token: NewToken) -> Result<Token> {
        let row: TokenRow = sqlx::query_as(
            r#"
            INSERT INTO tokens (value, user_id, kind, access_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, value, user_id, kind, access_id, created_at
            "#,
        )
        .bind(&token.value)
        .bind(token.user_id)
        .bind(token.kind.as_str())
        .bind(token.access_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to store token: {e}")))?;

        row.try_into()
    }

    async fn find_token_by_id(&self, id: i64) -> Result<Option<Token>> {
        let row: Option<TokenRow> =
            sqlx::query_as("SELECT id, value, user_id, kind, access_id, created_at FROM tokens WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| GockerError::DatabaseError(format!("Failed to fetch token: {e}")))?;

        row.map(Token::try_from).transpose()
    }

    async fn find_token_by_value(&self, value: &str) -> Result<Option<Token>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT id, value, user_id, kind, access_id, created_at FROM tokens WHERE value = $1 LIMIT 1",
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to fetch token: {e}")))?;

        row.map(Token::try_from).transpose()
    }

    async fn find_token_by_user_and_kind(
        &self,
        user_id: i64,
        kind: TokenKind,
    ) -> Result<Option<Token>> {
        let row: Option<TokenRow> = sqlx::query_as(
            r#"
            SELECT id, value, user_id, kind, access_id, created_at
            FROM tokens
            WHERE user_id = $1 AND kind = $2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to fetch token: {e}")))?;

        row.map(Token::try_from).transpose()
    }

    async fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT id, value, user_id, kind, access_id, created_at FROM tokens WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GockerError::DatabaseError(format!("Failed to list tokens: {e}")))?;

        rows.into_iter().map(Token::try_from).collect()
    }

    async fn update_token_value(&self, id: i64, value: &str) -> Result<()> {
        let result = sqlx::query("UPDATE tokens SET value = $2 WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| GockerError::DatabaseError(format!("Failed to update token: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(GockerError::NotFound("Token".to_string()));
        }

        Ok(())
    }

    async fn delete_token(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| GockerError::DatabaseError(format!("Failed to delete token: {e}")))?;

        Ok(())
    }
}
