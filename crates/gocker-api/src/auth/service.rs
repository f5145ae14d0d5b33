//! Authentication service layer
//!
//! Provides business logic for user registration, login, token refresh, and logout.
//! Issues access/refresh pairs through [`TokenCodec`] and records them in the
//! [`TokenStore`] so that the request gate can tell live tokens from revoked ones.

use super::jwt::TokenCodec;
use super::password::PasswordGuard;
use super::store::TokenStore;
use super::{validate_request, AuthError};
use chrono::Utc;
use gocker_core::{
    normalize_email, GockerError, NewUser, SessionPolicy, Token, TokenKind, User,
    UserRepository, UserRole,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// User registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "must be provided"))]
    pub first_name: String,
    #[validate(
        length(min = 1, message = "must be provided"),
        email(message = "must be a valid email address")
    )]
    pub email: String,
    #[validate(length(min = 1, message = "must be provided"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct AuthenticateRequest {
    #[validate(length(min = 1, message = "must be provided"))]
    pub email: String,
    #[validate(length(min = 1, message = "must be provided"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "must be provided"))]
    pub refresh_token: String,
}

/// Freshly issued and persisted access/refresh records
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

/// Authentication service
#[derive(Clone)]
pub struct TokenService {
    users: Arc<dyn UserRepository>,
    tokens: TokenStore,
    codec: Arc<TokenCodec>,
    guard: Arc<dyn PasswordGuard>,
    admin_email: Option<String>,
    session_policy: SessionPolicy,
}

impl TokenService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: TokenStore,
        codec: Arc<TokenCodec>,
        guard: Arc<dyn PasswordGuard>,
        admin_email: Option<String>,
        session_policy: SessionPolicy,
    ) -> Self {
        Self {
            users,
            tokens,
            codec,
            guard,
            admin_email,
            session_policy,
        }
    }

    /// Register a new account and issue its first token pair
    pub async fn register(&self, request: RegisterRequest) -> Result<(User, TokenPair), AuthError> {
        let user = self.create_account(request).await?;
        let pair = self.issue_pair(&user).await?;

        tracing::info!(user_id = user.id, role = %user.role, "user registered");
        Ok((user, pair))
    }

    /// Validate, protect the password, assign the role and persist the user.
    /// Issues no tokens.
    pub async fn create_account(&self, mut request: RegisterRequest) -> Result<User, AuthError> {
        request.email = normalize_email(&request.email);
        validate_request(&request)?;

        if self.users.find_user_by_email(&request.email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password = self.guard.protect(&request.password)?;
        let role = UserRole::for_new_account(&request.email, self.admin_email.as_deref());

        let user = self
            .users
            .create_user(NewUser {
                name: request.first_name,
                email: request.email,
                password,
                role,
            })
            .await?;

        Ok(user)
    }

    /// Check credentials and issue a fresh pair.
    ///
    /// Under [`SessionPolicy::Single`] every previously issued token of the
    /// user is revoked first. A failed attempt changes nothing.
    pub async fn authenticate(
        &self,
        mut request: AuthenticateRequest,
    ) -> Result<(User, TokenPair, usize), AuthError> {
        request.email = normalize_email(&request.email);
        validate_request(&request)?;

        let user = self
            .users
            .find_user_by_email(&request.email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        self.guard.verify(&user.password, &request.password)?;

        let revoked = match self.session_policy {
            SessionPolicy::Single => self.revoke_all(user.id).await?,
            SessionPolicy::Multiple => 0,
        };

        let pair = self.issue_pair(&user).await?;

        tracing::debug!(user_id = user.id, revoked, "user authenticated");
        Ok((user, pair, revoked))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The access record issued together with the presented refresh token is
    /// overwritten in place, so other sessions of the same user are left
    /// untouched. The refresh token itself is not rotated.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<(User, Token), AuthError> {
        validate_request(&request)?;

        let claims = self.codec.decode(&request.refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }

        let record = self
            .tokens
            .by_value(&request.refresh_token)
            .await
            .map_err(revoked_if_missing)?;
        if record.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .users
            .find_user_by_email(&claims.email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        if record.user_id != user.id {
            return Err(AuthError::Revoked);
        }

        let mut access = self
            .tokens
            .paired_access(&record)
            .await
            .map_err(|e| match e {
                GockerError::NotFound(_) => AuthError::NotFound("Access token".to_string()),
                other => other.into(),
            })?;

        let value = self.codec.issue(&user.email, TokenKind::Access, Utc::now())?;
        self.tokens.replace_value(&mut access, value).await?;

        Ok((user, access))
    }

    /// Revoke every token of the user
    pub async fn logout(&self, user_id: i64) -> Result<usize, AuthError> {
        self.revoke_all(user_id).await
    }

    /// Delete all token records of the user, returning how many were removed
    pub async fn revoke_all(&self, user_id: i64) -> Result<usize, AuthError> {
        let tokens = self.tokens.all_for_user(user_id).await?;
        for token in &tokens {
            self.tokens.delete(token.id).await?;
        }
        Ok(tokens.len())
    }

    async fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_value = self.codec.issue(&user.email, TokenKind::Access, now)?;
        let refresh_value = self.codec.issue(&user.email, TokenKind::Refresh, now)?;

        let access = self
            .tokens
            .create(user.id, TokenKind::Access, access_value)
            .await?;
        let refresh = self.tokens.create_refresh(&access, refresh_value).await?;

        Ok(TokenPair { access, refresh })
    }
}

fn revoked_if_missing(err: GockerError) -> AuthError {
    match err {
        GockerError::NotFound(_) => AuthError::Revoked,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{Argon2Guard, PasswordConfig};
    use chrono::Duration;
    use gocker_core::{InMemoryStore, TokenRepository};

    struct Fixture {
        service: TokenService,
        backend: Arc<InMemoryStore>,
        codec: Arc<TokenCodec>,
    }

    fn fixture(policy: SessionPolicy) -> Fixture {
        let backend = Arc::new(InMemoryStore::new());
        let codec = Arc::new(TokenCodec::new("service-secret").unwrap());
        let guard = Arc::new(Argon2Guard::new(&PasswordConfig::minimal()).unwrap());
        let service = TokenService::new(
            backend.clone(),
            TokenStore::new(backend.clone()),
            codec.clone(),
            guard,
            Some("admin@x.com".to_string()),
            policy,
        );
        Fixture {
            service,
            backend,
            codec,
        }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Tester".to_string(),
            email: email.to_string(),
            password: "pw-123".to_string(),
        }
    }

    fn login(email: &str, password: &str) -> AuthenticateRequest {
        AuthenticateRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_issues_pair_and_assigns_role() {
        let f = fixture(SessionPolicy::Single);

        let (admin, pair) = f.service.register(register_request("admin@x.com")).await.unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_ne!(admin.password, "pw-123");
        assert_eq!(pair.access.kind, TokenKind::Access);
        assert_eq!(pair.refresh.kind, TokenKind::Refresh);
        assert_eq!(f.codec.decode(&pair.access.value).unwrap().email, "admin@x.com");

        let (standard, _) = f.service.register(register_request("b@x.com")).await.unwrap();
        assert_eq!(standard.role, UserRole::Standard);
        assert_eq!(f.backend.token_count().await, 4);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let f = fixture(SessionPolicy::Single);
        f.service.register(register_request("a@x.com")).await.unwrap();

        let result = f.service.register(register_request("A@X.com")).await;
        assert!(matches!(result, Err(AuthError::DuplicateEmail)));
        assert_eq!(f.backend.token_count().await, 2);
    }

    #[tokio::test]
    async fn test_email_is_trimmed_before_storage() {
        let f = fixture(SessionPolicy::Single);
        let (user, _) = f
            .service
            .register(register_request("  a@x.com "))
            .await
            .unwrap();
        assert_eq!(user.email, "a@x.com");

        let duplicate = f.service.register(register_request("A@x.com\t")).await;
        assert!(matches!(duplicate, Err(AuthError::DuplicateEmail)));

        let (found, _, _) = f
            .service
            .authenticate(login(" a@x.com", "pw-123"))
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let f = fixture(SessionPolicy::Single);
        let result = f.service.register(RegisterRequest::default()).await;

        let Err(AuthError::Validation(messages)) = result else {
            panic!("expected validation failure");
        };
        assert!(messages.contains(&"Field first_name must be provided".to_string()));
        assert!(messages.contains(&"Field password must be provided".to_string()));
    }

    #[tokio::test]
    async fn test_authenticate_single_policy_revokes_previous() {
        let f = fixture(SessionPolicy::Single);
        let (_, first) = f.service.register(register_request("a@x.com")).await.unwrap();

        let (_, second, revoked) = f.service.authenticate(login("a@x.com", "pw-123")).await.unwrap();

        assert_eq!(revoked, 2);
        assert!(f.backend.find_token_by_value(&first.access.value).await.unwrap().is_none());
        assert!(f.backend.find_token_by_value(&second.access.value).await.unwrap().is_some());
        assert_eq!(f.backend.token_count().await, 2);
    }

    #[tokio::test]
    async fn test_authenticate_multiple_policy_keeps_previous() {
        let f = fixture(SessionPolicy::Multiple);
        let (_, first) = f.service.register(register_request("a@x.com")).await.unwrap();

        let (_, _, revoked) = f.service.authenticate(login("a@x.com", "pw-123")).await.unwrap();

        assert_eq!(revoked, 0);
        assert!(f.backend.find_token_by_value(&first.access.value).await.unwrap().is_some());
        assert_eq!(f.backend.token_count().await, 4);
    }

    #[tokio::test]
    async fn test_authenticate_failures_change_nothing() {
        let f = fixture(SessionPolicy::Single);
        f.service.register(register_request("a@x.com")).await.unwrap();

        let wrong = f.service.authenticate(login("a@x.com", "nope")).await;
        assert!(matches!(wrong, Err(AuthError::WrongCredential)));

        let unknown = f.service.authenticate(login("z@x.com", "pw-123")).await;
        assert!(matches!(unknown, Err(AuthError::NotFound(_))));

        assert_eq!(f.backend.token_count().await, 2);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_access_record() {
        let f = fixture(SessionPolicy::Single);
        let (_, pair) = f.service.register(register_request("a@x.com")).await.unwrap();

        let (_, access) = f
            .service
            .refresh(RefreshRequest {
                refresh_token: pair.refresh.value.clone(),
            })
            .await
            .unwrap();

        assert_eq!(access.id, pair.access.id);
        assert_ne!(access.value, pair.access.value);
        assert!(f.backend.find_token_by_value(&pair.access.value).await.unwrap().is_none());
        assert!(f.backend.find_token_by_value(&pair.refresh.value).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_only_touches_its_own_session() {
        let f = fixture(SessionPolicy::Multiple);
        let (_, first) = f.service.register(register_request("a@x.com")).await.unwrap();
        let (_, second, _) = f.service.authenticate(login("a@x.com", "pw-123")).await.unwrap();

        let (_, access) = f
            .service
            .refresh(RefreshRequest {
                refresh_token: first.refresh.value.clone(),
            })
            .await
            .unwrap();

        assert_eq!(access.id, first.access.id);
        assert!(f.backend.find_token_by_value(&first.access.value).await.unwrap().is_none());
        assert!(f.backend.find_token_by_value(&access.value).await.unwrap().is_some());
        assert!(f.backend.find_token_by_value(&second.access.value).await.unwrap().is_some());
        assert_eq!(f.backend.token_count().await, 4);
    }

    #[tokio::test]
    async fn test_refresh_failures() {
        let f = fixture(SessionPolicy::Single);
        let (user, pair) = f.service.register(register_request("a@x.com")).await.unwrap();

        let refresh = |token: String| f.service.refresh(RefreshRequest { refresh_token: token });

        // malformed
        assert!(matches!(
            refresh("garbage".to_string()).await,
            Err(AuthError::InvalidToken)
        ));

        // access token presented as refresh token
        assert!(matches!(
            refresh(pair.access.value.clone()).await,
            Err(AuthError::InvalidToken)
        ));

        // expired
        let stale = f
            .codec
            .issue("a@x.com", TokenKind::Refresh, Utc::now() - Duration::hours(9000))
            .unwrap();
        assert!(matches!(refresh(stale).await, Err(AuthError::Expired)));

        // validly signed but never stored
        let unknown = f.codec.issue("a@x.com", TokenKind::Refresh, Utc::now()).unwrap();
        assert!(matches!(refresh(unknown).await, Err(AuthError::Revoked)));

        // the user has no access record
        f.backend.delete_token(pair.access.id).await.unwrap();
        assert!(matches!(
            refresh(pair.refresh.value.clone()).await,
            Err(AuthError::NotFound(what)) if what == "Access token"
        ));

        // revoked by logout
        assert_eq!(f.service.logout(user.id).await.unwrap(), 1);
        assert!(matches!(
            refresh(pair.refresh.value.clone()).await,
            Err(AuthError::Revoked)
        ));
    }
}
