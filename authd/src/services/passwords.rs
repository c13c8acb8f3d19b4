//! Password hashing and reset secrets, with the CPU-heavy parts moved off the runtime.

use crate::{
    AppState,
    auth::password::{self, Argon2Params},
    config::PasswordResetConfig,
    errors::{Error, Result},
};

pub struct PasswordService {
    params: Argon2Params,
    reset: PasswordResetConfig,
}

/// A freshly generated reset: the token and password go to the user, only hashes are stored.
#[derive(Debug, Clone)]
pub struct ResetSecrets {
    pub token: String,
    pub token_hash: String,
    pub new_password: String,
}

impl PasswordService {
    pub fn new(state: &AppState) -> Self {
        Self {
            params: Argon2Params::from(&state.config.auth.password),
            reset: state.config.auth.password_reset.clone(),
        }
    }

    pub async fn hash(&self, plain: &str) -> Result<String> {
        let plain = plain.to_string();
        let params = self.params;
        tokio::task::spawn_blocking(move || password::hash_string_with_params(&plain, Some(params)))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })?
    }

    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool> {
        let plain = plain.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || password::verify_string(&plain, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })?
    }

    pub fn check_new_password(&self, plain: &str, repeat: &str) -> Result<()> {
        password::check_new_password(plain, repeat)
    }

    pub fn generate_reset(&self) -> ResetSecrets {
        let token = password::generate_token(self.reset.token_length);
        ResetSecrets {
            token_hash: password::hash_token(&token),
            token,
            new_password: password::generate_password(self.reset.password_length),
        }
    }

    pub fn hash_token(&self, token: &str) -> String {
        password::hash_token(token)
    }
}
