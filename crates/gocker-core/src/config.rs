//! Gocker Configuration Management
//!
//! Handles configuration from environment variables and an optional TOML
//! file, with sensible defaults for development. Secrets have no defaults:
//! `SECRET_KEY` must always be provided.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token and password settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Load the file named by `GOCKER_CONFIG` if set, then apply the
    /// environment on top, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("GOCKER_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path)?.with_env_override()?,
            _ => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "API_PORT".to_string(),
                value: port,
            })?;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(size) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = size.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DATABASE_MAX_CONNECTIONS".to_string(),
                value: size,
            })?;
        }

        // Auth
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            self.auth.secret_key = secret;
        }
        if let Ok(key) = std::env::var("USER_PASSWORD_KEY") {
            self.auth.password_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Ok(email) = std::env::var("ADMIN_EMAIL") {
            self.auth.admin_email = Some(email).filter(|e| !e.is_empty());
        }
        if let Ok(scheme) = std::env::var("PASSWORD_SCHEME") {
            self.auth.password_scheme = scheme.parse()?;
        }
        if let Ok(policy) = std::env::var("SESSION_POLICY") {
            self.auth.session_policy = policy.parse()?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Check that the secrets required by the selected schemes are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.is_empty() {
            return Err(ConfigError::MissingRequired("SECRET_KEY".to_string()));
        }

        if self.auth.password_scheme == PasswordScheme::Cipher {
            match self.auth.password_key.as_deref() {
                None => {
                    return Err(ConfigError::MissingRequired(
                        "USER_PASSWORD_KEY (required by PASSWORD_SCHEME=cipher)".to_string(),
                    ))
                }
                Some(key) if key.trim().is_empty() => {
                    return Err(ConfigError::MissingRequired("USER_PASSWORD_KEY".to_string()))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory store is used when absent
    pub url: Option<String>,

    /// PostgreSQL connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// Password protection scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    /// Salted Argon2id hashing (irreversible)
    #[default]
    Argon2,
    /// Authenticated encryption with `USER_PASSWORD_KEY` (reversible)
    Cipher,
}

impl std::str::FromStr for PasswordScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2" => Ok(Self::Argon2),
            "cipher" => Ok(Self::Cipher),
            _ => Err(ConfigError::InvalidValue {
                key: "PASSWORD_SCHEME".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// How many live sessions a user may hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// Re-authentication revokes every previously issued token
    #[default]
    Single,
    /// Tokens accumulate; each authentication adds a new pair
    Multiple,
}

impl std::str::FromStr for SessionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            _ => Err(ConfigError::InvalidValue {
                key: "SESSION_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Token and password configuration
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HMAC secret for token signing (`SECRET_KEY`)
    #[serde(default)]
    pub secret_key: String,

    /// Key material for the cipher password scheme (`USER_PASSWORD_KEY`)
    #[serde(default)]
    pub password_key: Option<String>,

    /// Address that receives the admin role at registration (`ADMIN_EMAIL`)
    #[serde(default)]
    pub admin_email: Option<String>,

    #[serde(default)]
    pub password_scheme: PasswordScheme,

    #[serde(default)]
    pub session_policy: SessionPolicy,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("password_key", &self.password_key.as_ref().map(|_| "<redacted>"))
            .field("admin_email", &self.admin_email)
            .field("password_scheme", &self.password_scheme)
            .field("session_policy", &self.session_policy)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.secret_key = "test-secret".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert_eq!(config.auth.password_scheme, PasswordScheme::Argon2);
        assert_eq!(config.auth.session_policy, SessionPolicy::Single);
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = AppConfig::default().validate();
        assert!(matches!(result, Err(ConfigError::MissingRequired(key)) if key == "SECRET_KEY"));
        assert!(config_with_secret().validate().is_ok());
    }

    #[test]
    fn test_cipher_scheme_requires_password_key() {
        let mut config = config_with_secret();
        config.auth.password_scheme = PasswordScheme::Cipher;
        assert!(config.validate().is_err());

        config.auth.password_key = Some("0123456789abcdef0123456789abcdef".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enum_parse() {
        assert_eq!("Cipher".parse::<PasswordScheme>().unwrap(), PasswordScheme::Cipher);
        assert_eq!("multiple".parse::<SessionPolicy>().unwrap(), SessionPolicy::Multiple);
        assert!("bcrypt".parse::<PasswordScheme>().is_err());
        assert!("none".parse::<SessionPolicy>().is_err());
    }

    #[test]
    fn test_toml_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            cors_origins = []

            [auth]
            secret_key = "from-file"
            admin_email = "root@example.com"
            session_policy = "multiple"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.secret_key, "from-file");
        assert_eq!(config.auth.admin_email.as_deref(), Some("root@example.com"));
        assert_eq!(config.auth.session_policy, SessionPolicy::Multiple);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = config_with_secret();
        config.auth.password_key = Some("super-secret-key".to_string());
        let debug = format!("{:?}", config.auth);
        assert!(!debug.contains("test-secret"));
        assert!(!debug.contains("super-secret-key"));
    }
}
