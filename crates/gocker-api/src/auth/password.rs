/// Password protection and verification
///
/// Two schemes are available behind the `PasswordGuard` trait:
/// - `Argon2Guard`: salted Argon2id hashing (irreversible, preferred)
/// - `CipherGuard`: ChaCha20-Poly1305 encryption under `USER_PASSWORD_KEY`
///
/// Neither implementation logs the plaintext or the candidate.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::{aead::Aead, aead::KeyInit, ChaCha20Poly1305, Key, Nonce};
use gocker_core::{AuthConfig, PasswordScheme};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Password protection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("wrong password. Please, try again")]
    WrongCredential,

    #[error("Password protection misconfigured: {0}")]
    Configuration(String),

    #[error("Stored credential cannot be read")]
    InvalidSecret,

    #[error("Failed to protect password: {0}")]
    HashingFailed(String),
}

/// Protects credential secrets and compares candidates against them
pub trait PasswordGuard: Send + Sync {
    /// Produce the stored form of `plaintext`. Never deterministic.
    fn protect(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// Succeeds only when `candidate` is exactly the protected password
    fn verify(&self, secret: &str, candidate: &str) -> Result<(), PasswordError>;
}

/// Password hashing configuration
///
/// These parameters are tuned for security while maintaining acceptable performance.
/// Increasing memory or iterations improves security but slows down hashing.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (threads, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// Cheapest parameters Argon2 accepts, for test suites
    #[cfg(any(test, feature = "test-utils"))]
    pub fn minimal() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::Configuration(e.to_string()))
    }
}

/// Argon2id hashing into PHC strings
pub struct Argon2Guard {
    hasher: Argon2<'static>,
}

impl Argon2Guard {
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = config.to_params()?;
        Ok(Self {
            hasher: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        })
    }
}

impl PasswordGuard for Argon2Guard {
    fn protect(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .hasher
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, candidate: &str) -> Result<(), PasswordError> {
        let parsed = PasswordHash::new(secret).map_err(|_| PasswordError::InvalidSecret)?;

        // parameters come from the PHC string, not from self
        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(PasswordError::WrongCredential),
            Err(e) => Err(PasswordError::HashingFailed(e.to_string())),
        }
    }
}

/// Reversible protection with a 32-byte process key
///
/// Stored form is base64url(nonce || ciphertext).
pub struct CipherGuard {
    key: Option<[u8; 32]>,
}

impl CipherGuard {
    pub fn new(key: Option<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Build from `USER_PASSWORD_KEY` material: 32 raw bytes or base64 of 32 bytes
    pub fn from_key_material(raw: Option<&str>) -> Result<Self, PasswordError> {
        match raw {
            None => Ok(Self::new(None)),
            Some(raw) => parse_key_material(raw)
                .map(|key| Self::new(Some(key)))
                .ok_or_else(|| {
                    PasswordError::Configuration(
                        "USER_PASSWORD_KEY must be 32 bytes, raw or base64".to_string(),
                    )
                }),
        }
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, PasswordError> {
        let key = self.key.as_ref().ok_or_else(|| {
            PasswordError::Configuration("USER_PASSWORD_KEY is not set".to_string())
        })?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(key)))
    }
}

impl PasswordGuard for CipherGuard {
    fn protect(&self, plaintext: &str) -> Result<String, PasswordError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| PasswordError::HashingFailed("encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(general_purpose::URL_SAFE_NO_PAD.encode(payload))
    }

    fn verify(&self, secret: &str, candidate: &str) -> Result<(), PasswordError> {
        let cipher = self.cipher()?;

        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(secret)
            .map_err(|_| PasswordError::InvalidSecret)?;
        if payload.len() <= NONCE_LEN {
            return Err(PasswordError::InvalidSecret);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| PasswordError::InvalidSecret)?;

        if plaintext == candidate.as_bytes() {
            Ok(())
        } else {
            Err(PasswordError::WrongCredential)
        }
    }
}

fn parse_key_material(raw: &str) -> Option<[u8; 32]> {
    let trimmed = raw.trim();

    for engine in [general_purpose::URL_SAFE_NO_PAD, general_purpose::STANDARD] {
        if let Ok(bytes) = engine.decode(trimmed) {
            if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
                return Some(key);
            }
        }
    }

    <[u8; 32]>::try_from(trimmed.as_bytes()).ok()
}

/// Build the guard selected by `PASSWORD_SCHEME`
pub fn guard_for(
    auth: &AuthConfig,
    hashing: &PasswordConfig,
) -> Result<Arc<dyn PasswordGuard>, PasswordError> {
    match auth.password_scheme {
        PasswordScheme::Argon2 => Ok(Arc::new(Argon2Guard::new(hashing)?)),
        PasswordScheme::Cipher => Ok(Arc::new(CipherGuard::from_key_material(
            auth.password_key.as_deref(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [7u8; 32];

    fn argon2() -> Argon2Guard {
        Argon2Guard::new(&PasswordConfig::minimal()).unwrap()
    }

    #[test]
    fn test_argon2_protect_and_verify() {
        let guard = argon2();
        let secret = guard.protect("SecureP@ssw0rd!").unwrap();

        assert!(secret.starts_with("$argon2id$"));
        assert!(!secret.contains("SecureP@ssw0rd!"));
        assert_eq!(guard.verify(&secret, "SecureP@ssw0rd!"), Ok(()));
        assert_eq!(
            guard.verify(&secret, "WrongPassword"),
            Err(PasswordError::WrongCredential)
        );
    }

    #[test]
    fn test_same_password_produces_different_secrets() {
        let guard = argon2();
        let first = guard.protect("SamePassword123!").unwrap();
        let second = guard.protect("SamePassword123!").unwrap();

        assert_ne!(first, second);
        assert!(guard.verify(&first, "SamePassword123!").is_ok());
        assert!(guard.verify(&second, "SamePassword123!").is_ok());
    }

    #[test]
    fn test_argon2_invalid_secret() {
        assert_eq!(
            argon2().verify("invalid-hash-format", "password"),
            Err(PasswordError::InvalidSecret)
        );
    }

    #[test]
    fn test_custom_config() {
        let config = PasswordConfig {
            memory_cost: 2048,
            time_cost: 2,
            parallelism: 2,
            output_len: Some(32),
        };
        let guard = Argon2Guard::new(&config).unwrap();
        let secret = guard.protect("TestPassword123!").unwrap();

        assert!(guard.verify(&secret, "TestPassword123!").is_ok());
        assert!(secret.contains("m=2048"));
        assert!(secret.contains("t=2"));
        assert!(secret.contains("p=2"));
    }

    #[test]
    fn test_invalid_config() {
        let config = PasswordConfig {
            memory_cost: 1,
            ..PasswordConfig::minimal()
        };
        assert!(matches!(
            Argon2Guard::new(&config),
            Err(PasswordError::Configuration(_))
        ));
    }

    #[test]
    fn test_cipher_protect_and_verify() {
        let guard = CipherGuard::new(Some(KEY));
        let first = guard.protect("hunter2").unwrap();
        let second = guard.protect("hunter2").unwrap();

        assert_ne!(first, second);
        assert_eq!(guard.verify(&first, "hunter2"), Ok(()));
        assert_eq!(guard.verify(&first, "hunter3"), Err(PasswordError::WrongCredential));
    }

    #[test]
    fn test_cipher_without_key() {
        let guard = CipherGuard::new(None);
        assert!(matches!(guard.protect("x"), Err(PasswordError::Configuration(_))));
        assert!(matches!(
            guard.verify("anything", "x"),
            Err(PasswordError::Configuration(_))
        ));
    }

    #[test]
    fn test_cipher_wrong_key_or_garbage() {
        let secret = CipherGuard::new(Some(KEY)).protect("hunter2").unwrap();
        let other = CipherGuard::new(Some([9u8; 32]));

        assert_eq!(other.verify(&secret, "hunter2"), Err(PasswordError::InvalidSecret));
        assert_eq!(other.verify("!!!", "hunter2"), Err(PasswordError::InvalidSecret));
        assert_eq!(other.verify("AAAA", "hunter2"), Err(PasswordError::InvalidSecret));
    }

    #[test]
    fn test_key_material_parsing() {
        let raw = "0123456789abcdef0123456789abcdef";
        assert_eq!(parse_key_material(raw), Some(*b"0123456789abcdef0123456789abcdef"));

        let encoded = general_purpose::STANDARD.encode(KEY);
        assert_eq!(parse_key_material(&encoded), Some(KEY));

        assert!(parse_key_material("too-short").is_none());
        assert!(matches!(
            CipherGuard::from_key_material(Some("too-short")),
            Err(PasswordError::Configuration(_))
        ));
    }

    #[test]
    fn test_guard_for_scheme() {
        let mut auth = AuthConfig::default();
        assert!(guard_for(&auth, &PasswordConfig::minimal()).is_ok());

        auth.password_scheme = PasswordScheme::Cipher;
        auth.password_key = Some("0123456789abcdef0123456789abcdef".to_string());
        let guard = guard_for(&auth, &PasswordConfig::minimal()).unwrap();
        let secret = guard.protect("pw").unwrap();
        assert!(!secret.starts_with("$argon2"));
        assert!(guard.verify(&secret, "pw").is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_argon2_round_trip(password in "[ -~]{1,32}", other in "[ -~]{1,32}") {
            let guard = argon2();
            let secret = guard.protect(&password).unwrap();
            prop_assert!(guard.verify(&secret, &password).is_ok());
            if other != password {
                prop_assert_eq!(guard.verify(&secret, &other), Err(PasswordError::WrongCredential));
            }
        }

        #[test]
        fn prop_cipher_round_trip(password in "\\PC{0,48}", other in "\\PC{0,48}") {
            let guard = CipherGuard::new(Some(KEY));
            let secret = guard.protect(&password).unwrap();
            prop_assert!(guard.verify(&secret, &password).is_ok());
            if other != password {
                prop_assert_eq!(guard.verify(&secret, &other), Err(PasswordError::WrongCredential));
            }
        }
    }
}
