//! JWT token generation and validation
//!
//! Implements the signed, expiring claim set carried by access and refresh
//! tokens. Tokens are HS256-signed with the process secret; any other
//! algorithm is rejected.

use chrono::{DateTime, Duration, Utc};
use gocker_core::TokenKind;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Access tokens live for one day
pub const ACCESS_TOKEN_LIFETIME_HOURS: i64 = 24;

/// Refresh tokens live for roughly one year
pub const REFRESH_TOKEN_LIFETIME_HOURS: i64 = 8766;

/// Lifetime of a token of the given kind
pub fn lifetime(kind: TokenKind) -> Duration {
    match kind {
        TokenKind::Access => Duration::hours(ACCESS_TOKEN_LIFETIME_HOURS),
        TokenKind::Refresh => Duration::hours(REFRESH_TOKEN_LIFETIME_HOURS),
    }
}

/// JWT claims embedded in every issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject email address
    pub email: String,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,
    /// Issued at timestamp (Unix epoch seconds)
    pub iat: i64,
    /// Access or refresh
    pub kind: TokenKind,
    /// Unique token id, keeps same-second tokens distinct
    pub jti: String,
}

/// Token codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid token signature")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token codec misconfigured: {0}")]
    Configuration(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::SignatureInvalid,
            ErrorKind::InvalidKeyFormat => JwtError::Configuration(err.to_string()),
            _ => JwtError::Malformed,
        }
    }
}

/// Encodes and decodes signed tokens with the process secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the HMAC secret
    pub fn new(secret: &str) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::Configuration("SECRET_KEY is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Issue a token for `email` whose lifetime starts at `now`
    pub fn issue(&self, email: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<String, JwtError> {
        let claims = Claims {
            email: email.to_string(),
            exp: (now + lifetime(kind)).timestamp(),
            iat: now.timestamp(),
            kind,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| match e.kind() {
            ErrorKind::Json(_) => JwtError::Malformed,
            _ => JwtError::Configuration(e.to_string()),
        })
    }

    /// Verify the signature and expiry of `token` and return its claims
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}
