use std::ops::RangeInclusive;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Duration;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ApiError;

/// Accepted password length on registration
pub const REGISTER_PASSWORD_LENGTH: RangeInclusive<usize> = 8..=20;
/// Accepted password length on reset, update and admin creation
pub const CHANGE_PASSWORD_LENGTH: RangeInclusive<usize> = 8..=16;

pub const VERIFICATION_CODE_TTL: Duration = Duration::minutes(10);
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(15);

const RESET_TOKEN_BYTES: usize = 20;

pub fn check_password_length(
    password: &str,
    allowed: RangeInclusive<usize>,
) -> Result<(), ApiError> {
    let length = password.chars().count();
    if allowed.contains(&length) {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "Password must be between {} and {} characters",
            allowed.start(),
            allowed.end()
        )))
    }
}

fn hash_password_blocking(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::Internal(format!("Failed to hash password: {err}")))
}

fn verify_password_blocking(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!("Stored password hash is malformed: {}", err);
            false
        }
    }
}

/// Argon2 hash with a fresh salt, computed on the blocking thread pool
pub async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|err| ApiError::Internal(format!("Password hashing task failed: {err}")))?
}

/// False for a wrong password and for a hash that cannot be parsed.
/// Runs on the blocking thread pool like [`hash_password`].
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool, ApiError> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &password_hash))
        .await
        .map_err(|err| ApiError::Internal(format!("Password verification task failed: {err}")))
}

/// Five digit code, never starting with zero
pub fn generate_verification_code() -> u32 {
    generate_verification_code_with(&mut rand::thread_rng())
}

pub fn generate_verification_code_with<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    let first_digit = rng.gen_range(1..=9u32);
    let remaining_digits = rng.gen_range(0..10_000u32);
    first_digit * 10_000 + remaining_digits
}

/// Random token sent to the user, returned hex encoded
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Only this digest of the reset token is ever stored
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Trimmed and lowercased, so one mailbox maps to one account
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod credentials_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[tokio::test]
    async fn test_password_hash_verifies_only_the_hashed_password() {
        let hash = hash_password("correct horse").await.unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("wrong horse", &hash).await.unwrap());
        assert!(!verify_password("correct horse", "not a hash").await.unwrap());
    }

    #[tokio::test]
    async fn test_same_password_gets_different_salts() {
        assert_ne!(
            hash_password("password1").await.unwrap(),
            hash_password("password1").await.unwrap()
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_leaves_the_async_worker_free() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                }
            }
        });

        let hash = hash_password("correct horse").await.unwrap();
        assert!(verify_password("correct horse", &hash).await.unwrap());
        ticker.abort();

        let ticks = ticks.load(Ordering::Relaxed);
        assert!(ticks > 1, "worker was blocked, only {ticks} ticks");
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(check_password_length("1234567", REGISTER_PASSWORD_LENGTH).is_err());
        assert!(check_password_length("12345678", REGISTER_PASSWORD_LENGTH).is_ok());
        assert!(check_password_length(&"x".repeat(20), REGISTER_PASSWORD_LENGTH).is_ok());
        assert!(check_password_length(&"x".repeat(21), REGISTER_PASSWORD_LENGTH).is_err());
        assert!(check_password_length(&"x".repeat(17), CHANGE_PASSWORD_LENGTH).is_err());
        assert!(check_password_length(&"x".repeat(16), CHANGE_PASSWORD_LENGTH).is_ok());
    }

    #[test]
    fn test_verification_code_has_five_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let code = generate_verification_code_with(&mut rng);
            assert!((10_000..=99_999).contains(&code), "code {code}");
        }
    }

    #[test]
    fn test_reset_token_is_random_hex_and_hash_is_stable() {
        let token = generate_reset_token();
        assert_eq!(token.len(), RESET_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());

        assert_eq!(hash_reset_token(&token), hash_reset_token(&token));
        assert_ne!(hash_reset_token(&token), token);
        assert_eq!(hash_reset_token(&token).len(), 64);
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Reader@Example.COM "), "reader@example.com");
    }
}
