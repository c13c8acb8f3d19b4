//! Database models for password reset tokens.

use crate::types::PasswordTokenId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A pending password reset. There is at most one per email.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordToken {
    pub id: PasswordTokenId,
    pub email: String,
    /// Hex SHA-256 of the token that was emailed to the user
    pub token_hash: String,
    /// Argon2 hash of the generated password that becomes active on confirmation
    pub new_password_hash: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PasswordTokenCreateDBRequest {
    pub email: String,
    pub token_hash: String,
    pub new_password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct PasswordTokenUpdateDBRequest {
    pub token_hash: Option<String>,
    pub new_password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PasswordTokenFilter {
    pub email: Option<String>,
    pub skip: i64,
    pub limit: i64,
}
