//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database entity model
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub nickname_number: i64,
    /// Path of the avatar file relative to the media root
    pub avatar: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_premium: bool,
    pub is_censorship_enabled: bool,
    pub is_language_english: bool,
    pub is_thumbnail_modern: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Response type (same as entity)
pub type UserDBResponse = User;

/// Database request for creating a new user
///
/// The email must already be normalised and the nickname number allocated.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub nickname_number: i64,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Database request for updating a user. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub nickname_number: Option<i64>,
    pub avatar: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_premium: Option<bool>,
    pub is_censorship_enabled: Option<bool>,
    pub is_language_english: Option<bool>,
    pub is_thumbnail_modern: Option<bool>,
}

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}
