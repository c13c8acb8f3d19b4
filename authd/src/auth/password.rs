//! Password hashing, strength rules and reset token helpers.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::prelude::RngExt;
use rand::rng;
use sha2::{Digest, Sha256};

use crate::{config::PasswordConfig, errors::Error};

/// Characters used for generated passwords and reset tokens.
const GENERATED_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 30;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a string using Argon2.
///
/// Uses the provided parameters or secure defaults if None.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash string: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Hash a string using Argon2 with default secure parameters.
pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, None)
}

/// Verify a string against a hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    // Verification always uses params from the hash
    let argon2 = Argon2::default();
    Ok(argon2.verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Check a new password against the strength rules, returning the first rule it breaks.
pub fn check_strength(password: &str) -> Result<(), Error> {
    let length = password.chars().count();
    if !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&length) {
        return Err(Error::Validation {
            message: format!("Password must be from {PASSWORD_MIN_LENGTH} to {PASSWORD_MAX_LENGTH} characters long."),
        });
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) || !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::Validation {
            message: "At least one lowercase and uppercase characters.".to_string(),
        });
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::Validation {
            message: "At least one number.".to_string(),
        });
    }

    Ok(())
}

/// Strength rules plus the repeat field match.
pub fn check_new_password(password: &str, password_repeat: &str) -> Result<(), Error> {
    check_strength(password)?;

    if password != password_repeat {
        return Err(Error::Validation {
            message: "Passwords do not match".to_string(),
        });
    }

    Ok(())
}

fn random_string(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| GENERATED_CHARSET[rng.random_range(0..GENERATED_CHARSET.len())] as char)
        .collect()
}

/// Generate a random password that satisfies [`check_strength`] when `length` is in range.
pub fn generate_password(length: usize) -> String {
    loop {
        let candidate = random_string(length);
        if length > PASSWORD_MAX_LENGTH || check_strength(&candidate).is_ok() {
            return candidate;
        }
    }
}

/// Generate a random alphanumeric token for password reset emails.
pub fn generate_token(length: usize) -> String {
    random_string(length)
}

/// Hex-encoded SHA-256 of a reset token. Only this digest is stored.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> Option<Argon2Params> {
        Some(Argon2Params {
            memory_kib: 128,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn test_string_hashing() {
        let input = "test_password_123";
        let hash = hash_string_with_params(input, fast_params()).unwrap();

        assert!(!hash.is_empty());
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_string(input, &hash).unwrap());
        assert!(!verify_string("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_input_different_hashes() {
        let input = "same_password";

        let hash1 = hash_string_with_params(input, fast_params()).unwrap();
        let hash2 = hash_string_with_params(input, fast_params()).unwrap();

        // Same input should produce different hashes due to salt
        assert_ne!(hash1, hash2);
        assert!(verify_string(input, &hash1).unwrap());
        assert!(verify_string(input, &hash2).unwrap());
    }

    #[test]
    fn test_default_params_hash_verifies() {
        let hash = hash_string("Pass12345").unwrap();
        assert!(verify_string("Pass12345", &hash).unwrap());
    }

    #[test]
    fn test_verify_garbage_hash_is_error() {
        assert!(verify_string("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_strength_rules() {
        assert!(check_strength("Pass12345").is_ok());

        let cases = [
            ("Pa1", "Password must be from 8 to 30 characters long."),
            ("Pass1234567890123456789012345678", "Password must be from 8 to 30 characters long."),
            ("pass12345", "At least one lowercase and uppercase characters."),
            ("PASS12345", "At least one lowercase and uppercase characters."),
            ("Passwordd", "At least one number."),
        ];
        for (password, message) in cases {
            match check_strength(password) {
                Err(Error::Validation { message: got }) => assert_eq!(got, message, "for {password}"),
                other => panic!("expected validation error for {password}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_repeat_must_match() {
        assert!(check_new_password("Pass12345", "Pass12345").is_ok());
        let err = check_new_password("Pass12345", "Pass123456").unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_generate_password_is_strong() {
        for _ in 0..20 {
            let password = generate_password(14);
            assert_eq!(password.len(), 14);
            assert!(check_strength(&password).is_ok(), "weak password generated: {password}");
        }
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token(255);
        let token2 = generate_token(255);

        assert_ne!(token1, token2);
        assert_eq!(token1.len(), 255);
        assert!(token1.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("token").len(), 64);
    }
}
