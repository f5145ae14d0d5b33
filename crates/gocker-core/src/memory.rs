//! In-memory storage backend
//!
//! Used when no `DATABASE_URL` is configured and by the test suites.
//! Users and tokens live behind one lock so that deleting a user and its
//! tokens is a single step.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{
    emails_match, GockerError, NewToken, NewUser, Result, Token, TokenKind, TokenRepository,
    User, UserRepository,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<i64, Token>,
    next_user_id: i64,
    next_token_id: i64,
}

/// In-memory user and token store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token records currently held
    pub async fn token_count(&self) -> usize {
        self.tables.read().await.tokens.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|existing| emails_match(&existing.email, &user.email))
        {
            return Err(GockerError::DuplicateEmail);
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: tables.next_user_id,
            name: user.name,
            email: user.email,
            password: user.password,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| emails_match(&user.email, email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|other| other.id != user.id && emails_match(&other.email, &user.email))
        {
            return Err(GockerError::DuplicateEmail);
        }

        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or_else(|| GockerError::NotFound("User".to_string()))?;
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password = user.password.clone();
        stored.updated_at = Utc::now();

        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;

        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.tokens.retain(|_, token| token.user_id != id);

        Ok(true)
    }
}

#[async_trait]
impl TokenRepository for InMemoryStore {
    async fn insert_token(&self, token: NewToken) -> Result<Token> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&token.user_id) {
            return Err(GockerError::NotFound("User".to_string()));
        }

        tables.next_token_id += 1;
        let created = Token {
            id: tables.next_token_id,
            value: token.value,
            user_id: token.user_id,
            kind: token.kind,
            access_id: token.access_id,
            created_at: Utc::now(),
        };
        tables.tokens.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_token_by_id(&self, id: i64) -> Result<Option<Token>> {
        Ok(self.tables.read().await.tokens.get(&id).cloned())
    }

    async fn find_token_by_value(&self, value: &str) -> Result<Option<Token>> {
        Ok(self
            .tables
            .read()
            .await
            .tokens
            .values()
            .find(|token| token.value == value)
            .cloned())
    }

    async fn find_token_by_user_and_kind(
        &self,
        user_id: i64,
        kind: TokenKind,
    ) -> Result<Option<Token>> {
        // ids are monotonic, so the last match is the newest record
        Ok(self
            .tables
            .read()
            .await
            .tokens
            .values()
            .filter(|token| token.user_id == user_id && token.kind == kind)
            .last()
            .cloned())
    }

    async fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        Ok(self
            .tables
            .read()
            .await
            .tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_token_value(&self, id: i64, value: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let token = tables
            .tokens
            .get_mut(&id)
            .ok_or_else(|| GockerError::NotFound("Token".to_string()))?;
        token.value = value.to_string();
        Ok(())
    }

    async fn delete_token(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.tokens.remove(&id);
        for token in tables.tokens.values_mut() {
            if token.access_id == Some(id) {
                token.access_id = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserRole;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password: "protected".to_string(),
            role: UserRole::Standard,
        }
    }

    fn new_token(user_id: i64, value: &str, kind: TokenKind) -> NewToken {
        NewToken {
            value: value.to_string(),
            user_id,
            kind,
            access_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("Test@Example.com")).await.unwrap();

        assert_eq!(user.id, 1);
        let found = store.find_user_by_email("test@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(store.find_user_by_email("test@example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();

        let result = store.create_user(new_user("A@X.COM")).await;
        assert!(matches!(result, Err(GockerError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_update_user_email_conflict() {
        let store = InMemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let mut b = store.create_user(new_user("b@x.com")).await.unwrap();

        b.email = "a@x.com".to_string();
        assert!(matches!(
            store.update_user(&b).await,
            Err(GockerError::DuplicateEmail)
        ));

        b.email = "b2@x.com".to_string();
        store.update_user(&b).await.unwrap();
        let stored = store.find_user_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "b2@x.com");
    }

    #[tokio::test]
    async fn test_token_lookup_by_user_and_kind_returns_newest() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();

        store
            .insert_token(new_token(user.id, "first", TokenKind::Access))
            .await
            .unwrap();
        store
            .insert_token(new_token(user.id, "refresh", TokenKind::Refresh))
            .await
            .unwrap();
        let second = store
            .insert_token(new_token(user.id, "second", TokenKind::Access))
            .await
            .unwrap();

        let found = store
            .find_token_by_user_and_kind(user.id, TokenKind::Access)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, second);
        assert_eq!(store.tokens_for_user(user.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_token_value_is_exact_match() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let token = store
            .insert_token(new_token(user.id, "abc.def.ghi", TokenKind::Access))
            .await
            .unwrap();

        assert!(store.find_token_by_value("abc.def.gh").await.unwrap().is_none());
        assert!(store.find_token_by_value("%").await.unwrap().is_none());

        store.update_token_value(token.id, "new.value.sig").await.unwrap();
        assert!(store.find_token_by_value("abc.def.ghi").await.unwrap().is_none());
        assert_eq!(
            store
                .find_token_by_value("new.value.sig")
                .await
                .unwrap()
                .map(|t| t.id),
            Some(token.id)
        );
    }

    #[tokio::test]
    async fn test_delete_user_cascades_tokens() {
        let store = InMemoryStore::new();
        let a = store.create_user(new_user("a@x.com")).await.unwrap();
        let b = store.create_user(new_user("b@x.com")).await.unwrap();
        store
            .insert_token(new_token(a.id, "a-token", TokenKind::Access))
            .await
            .unwrap();
        store
            .insert_token(new_token(b.id, "b-token", TokenKind::Access))
            .await
            .unwrap();

        assert!(store.delete_user(a.id).await.unwrap());
        assert!(!store.delete_user(a.id).await.unwrap());
        assert!(store.find_token_by_value("a-token").await.unwrap().is_none());
        assert!(store.find_token_by_value("b-token").await.unwrap().is_some());
        assert_eq!(store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_deleting_access_clears_pairing() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let access = store
            .insert_token(new_token(user.id, "access", TokenKind::Access))
            .await
            .unwrap();
        let refresh = store
            .insert_token(NewToken {
                access_id: Some(access.id),
                ..new_token(user.id, "refresh", TokenKind::Refresh)
            })
            .await
            .unwrap();
        assert_eq!(refresh.access_id, Some(access.id));

        store.delete_token(access.id).await.unwrap();
        let refresh = store.find_token_by_id(refresh.id).await.unwrap().unwrap();
        assert_eq!(refresh.access_id, None);
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_rejected() {
        let store = InMemoryStore::new();
        let result = store
            .insert_token(new_token(42, "orphan", TokenKind::Refresh))
            .await;
        assert!(matches!(result, Err(GockerError::NotFound(_))));
    }
}
