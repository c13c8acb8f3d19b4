//! API request/response models for users and their profiles.

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The user claims carried inside every access and refresh token.
///
/// Handlers receive this through the bearer extractor in [`crate::auth::current_user`];
/// it is rebuilt from the database row whenever tokens are issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub nickname_number: i64,
    pub is_active: bool,
    pub is_premium: bool,
    pub is_censorship_enabled: bool,
    pub is_language_english: bool,
    pub is_thumbnail_modern: bool,
}

impl From<&UserDBResponse> for UserPayload {
    fn from(db: &UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email.clone(),
            nickname: db.nickname.clone(),
            nickname_number: db.nickname_number,
            is_active: db.is_active,
            is_premium: db.is_premium,
            is_censorship_enabled: db.is_censorship_enabled,
            is_language_english: db.is_language_english,
            is_thumbnail_modern: db.is_thumbnail_modern,
        }
    }
}

// Profile response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub nickname_number: i64,
    /// Public URL of the avatar, under the media prefix
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_premium: bool,
    pub is_censorship_enabled: bool,
    pub is_language_english: bool,
    pub is_thumbnail_modern: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl ProfileResponse {
    /// Build the profile view, resolving the stored avatar path against the media URL prefix.
    pub fn from_db(db: UserDBResponse, media_url_path: &str) -> Self {
        let avatar = db
            .avatar
            .map(|path| format!("{}/{}", media_url_path.trim_end_matches('/'), path.trim_start_matches('/')));

        Self {
            id: db.id,
            email: db.email,
            nickname: db.nickname,
            nickname_number: db.nickname_number,
            avatar,
            is_active: db.is_active,
            is_premium: db.is_premium,
            is_censorship_enabled: db.is_censorship_enabled,
            is_language_english: db.is_language_english,
            is_thumbnail_modern: db.is_thumbnail_modern,
            last_login: db.last_login,
            date_created: db.date_created,
        }
    }
}

// Profile request models
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    /// Letters, numbers and spaces, 4 to 20 characters. Changing it assigns a new number.
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub is_censorship_enabled: Option<bool>,
    pub is_language_english: Option<bool>,
    pub is_thumbnail_modern: Option<bool>,
}

/// Returned by profile mutations so clients can refresh their cached payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileAndPayloadResponse {
    pub profile: ProfileResponse,
    pub payload: UserPayload,
}
