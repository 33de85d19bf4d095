//! Password hashing and one-time codes.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use rand::{distr::Alphanumeric, Rng};

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};

const TEMP_PASSWORD_LEN: usize = 10;

/// Argon2id hasher built from `[auth]` settings. Cheap to clone.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
}

impl Passwords {
    pub fn new(cfg: &AuthConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.argon2_memory_kib, cfg.argon2_iterations, 1, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    /// Hashes on the blocking pool; Argon2 is deliberately slow.
    pub async fn hash(&self, plain: &str) -> AppResult<String> {
        let params = self.params.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(plain.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))?
    }

    /// `false` for a mismatch and for a stored value that is not a PHC hash.
    pub async fn verify(&self, plain: &str, stored: &str) -> AppResult<bool> {
        let plain = plain.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
            Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!("Stored password hash is malformed: {}", e);
                false
            }
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("verification task failed: {}", e)))
    }
}

/// Six-digit verification code.
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

pub fn generate_temporary_password() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(TEMP_PASSWORD_LEN).map(char::from).collect()
}

pub fn contains_whitespace(value: &str) -> bool {
    value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Passwords {
        Passwords::new(&AuthConfig {
            reset_code_ttl_secs: 600,
            reset_max_attempts: 5,
            argon2_memory_kib: 64,
            argon2_iterations: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let pw = fast();
        let hash = pw.hash("s3cret").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(pw.verify("s3cret", &hash).await.unwrap());
        assert!(!pw.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_plaintext_storage() {
        assert!(!fast().verify("s3cret", "s3cret").await.unwrap());
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn test_temporary_password() {
        let p = generate_temporary_password();
        assert_eq!(p.len(), TEMP_PASSWORD_LEN);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_contains_whitespace() {
        assert!(contains_whitespace("a b"));
        assert!(contains_whitespace("tab\there"));
        assert!(!contains_whitespace("nospace"));
    }
}
