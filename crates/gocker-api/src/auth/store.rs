//! Issued-token lookup and revocation
//!
//! A thin adapter over [`TokenRepository`] that turns absent records into
//! `NotFound` errors. It carries no policy.

use gocker_core::{GockerError, NewToken, Result, Token, TokenKind, TokenRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn TokenRepository>,
}

impl TokenStore {
    pub fn new(repo: Arc<dyn TokenRepository>) -> Self {
        Self { repo }
    }

    pub async fn by_id(&self, id: i64) -> Result<Token> {
        self.repo
            .find_token_by_id(id)
            .await?
            .ok_or_else(not_found)
    }

    /// Exact match on the encoded value
    pub async fn by_value(&self, value: &str) -> Result<Token> {
        self.repo
            .find_token_by_value(value)
            .await?
            .ok_or_else(not_found)
    }

    /// Newest record of `kind` owned by the user
    pub async fn by_user_and_kind(&self, user_id: i64, kind: TokenKind) -> Result<Token> {
        self.repo
            .find_token_by_user_and_kind(user_id, kind)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn create(&self, user_id: i64, kind: TokenKind, value: String) -> Result<Token> {
        self.repo
            .insert_token(NewToken {
                value,
                user_id,
                kind,
                access_id: None,
            })
            .await
    }

    /// Record a refresh token paired with the access record issued alongside it
    pub async fn create_refresh(&self, access: &Token, value: String) -> Result<Token> {
        self.repo
            .insert_token(NewToken {
                value,
                user_id: access.user_id,
                kind: TokenKind::Refresh,
                access_id: Some(access.id),
            })
            .await
    }

    /// Access record belonging to the same pair as `refresh`
    pub async fn paired_access(&self, refresh: &Token) -> Result<Token> {
        let id = refresh.access_id.ok_or_else(not_found)?;
        let access = self.by_id(id).await?;
        if access.kind != TokenKind::Access || access.user_id != refresh.user_id {
            return Err(not_found());
        }
        Ok(access)
    }

    /// Overwrite the value of an existing record, keeping its id
    pub async fn replace_value(&self, token: &mut Token, value: String) -> Result<()> {
        self.repo.update_token_value(token.id, &value).await?;
        token.value = value;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repo.delete_token(id).await
    }

    /// Snapshot of every record the user currently owns
    pub async fn all_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        self.repo.tokens_for_user(user_id).await
    }
}

fn not_found() -> GockerError {
    GockerError::NotFound("Token".to_string())
}
