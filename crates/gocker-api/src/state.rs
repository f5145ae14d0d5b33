//! Application state management

use crate::auth::{
    guard_for, AuthError, PasswordConfig, PasswordGuard, TokenCodec, TokenService, TokenStore,
};
use gocker_core::config::AppConfig;
use gocker_core::{InMemoryStore, TokenRepository, UserRepository};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// User persistence
    pub users: Arc<dyn UserRepository>,
    /// Issued tokens
    pub tokens: TokenStore,
    pub codec: Arc<TokenCodec>,
    pub guard: Arc<dyn PasswordGuard>,
    /// Registration, login, refresh and logout
    pub auth: TokenService,
}

impl AppState {
    /// Wire the auth components over the given repositories.
    ///
    /// Fails when the token secret or the password key material is unusable.
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        hashing: &PasswordConfig,
    ) -> Result<Self, AuthError> {
        let codec = Arc::new(TokenCodec::new(&config.auth.secret_key)?);
        let guard = guard_for(&config.auth, hashing)?;
        let tokens = TokenStore::new(tokens);

        let auth = TokenService::new(
            users.clone(),
            tokens.clone(),
            codec.clone(),
            guard.clone(),
            config.auth.admin_email.clone(),
            config.auth.session_policy,
        );

        Ok(Self {
            config,
            start_time: Instant::now(),
            users,
            tokens,
            codec,
            guard,
            auth,
        })
    }

    /// State backed by a fresh [`InMemoryStore`]
    pub fn in_memory(config: AppConfig, hashing: &PasswordConfig) -> Result<Self, AuthError> {
        let store = Arc::new(InMemoryStore::new());
        Self::new(config, store.clone(), store, hashing)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gocker_core::PasswordScheme;

    #[test]
    fn test_state_requires_secret() {
        let result = AppState::in_memory(AppConfig::default(), &PasswordConfig::minimal());
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_state_rejects_bad_password_key() {
        let mut config = AppConfig::default();
        config.auth.secret_key = "secret".to_string();
        config.auth.password_scheme = PasswordScheme::Cipher;
        config.auth.password_key = Some("short".to_string());

        let result = AppState::in_memory(config, &PasswordConfig::minimal());
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
