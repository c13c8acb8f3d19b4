//! Profile reads and updates, avatar changes and nickname numbering.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use chrono::Utc;
use lettre::Address;
use rand::prelude::RngExt;
use rand::rng;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::users::ProfileUpdate,
    config::AvatarConfig,
    db::{
        errors::DbError,
        handlers::{Repository, Users},
        models::users::{UserDBResponse, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    services::images,
    types::{NICKNAME_NUMBER_MAX, NICKNAME_NUMBER_MIN, UserId, abbrev_uuid},
};

pub const NICKNAME_MIN_LENGTH: usize = 4;
pub const NICKNAME_MAX_LENGTH: usize = 20;

/// Letters, numbers and spaces, 4 to 20 characters.
pub fn validate_nickname(nickname: &str) -> Result<()> {
    let valid = (NICKNAME_MIN_LENGTH..=NICKNAME_MAX_LENGTH).contains(&nickname.len())
        && nickname.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ');

    if valid {
        Ok(())
    } else {
        Err(Error::Validation {
            message: "Nickname should contain only letters, numbers and space. From 4 to 20 characters long.".to_string(),
        })
    }
}

/// Check the address syntax and return it lowercased.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    Address::from_str(email).map_err(|e| Error::InvalidEmail { reason: e.to_string() })?;
    Ok(email.to_lowercase())
}

/// Pick a random nickname number not yet used with `nickname`.
pub async fn allocate_nickname_number(conn: &mut SqliteConnection, nickname: &str) -> Result<i64> {
    let taken: HashSet<i64> = Users::new(conn).taken_nickname_numbers(nickname).await?.into_iter().collect();

    let free: Vec<i64> = (NICKNAME_NUMBER_MIN..=NICKNAME_NUMBER_MAX).filter(|n| !taken.contains(n)).collect();
    if free.is_empty() {
        return Err(Error::NoFreeNickname);
    }

    Ok(free[rng().random_range(0..free.len())])
}

pub struct UserService {
    db: SqlitePool,
    media_root: PathBuf,
    avatar: AvatarConfig,
}

impl UserService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            media_root: state.config.media.root.clone(),
            avatar: state.config.media.avatar.clone(),
        }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_profile(&self, user_id: UserId) -> Result<UserDBResponse> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })
    }

    /// Apply a profile patch. A new nickname gets a freshly allocated number; a new email must
    /// be unused.
    #[instrument(skip(self, update), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn patch_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<UserDBResponse> {
        let mut tx = self.db.begin().await.map_err(DbError::from)?;
        let current = Users::new(&mut tx).get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;

        let mut request = UserUpdateDBRequest {
            is_censorship_enabled: update.is_censorship_enabled,
            is_language_english: update.is_language_english,
            is_thumbnail_modern: update.is_thumbnail_modern,
            ..Default::default()
        };

        if let Some(nickname) = update.nickname
            && nickname != current.nickname
        {
            validate_nickname(&nickname)?;
            request.nickname_number = Some(allocate_nickname_number(&mut tx, &nickname).await?);
            request.nickname = Some(nickname);
        }

        if let Some(email) = update.email {
            let email = normalize_email(&email)?;
            if email != current.email {
                if Users::new(&mut tx).email_exists(&email).await? {
                    return Err(Error::EmailAlreadyExists);
                }
                request.email = Some(email);
            }
        }

        let updated = Users::new(&mut tx).update(user_id, &request).await.map_err(|e| {
            if e.is_unique_violation_on("users", "email") {
                Error::EmailAlreadyExists
            } else {
                Error::Database(e)
            }
        })?;
        tx.commit().await.map_err(DbError::from)?;

        Ok(updated)
    }

    /// Process and store a new avatar, replacing (and deleting) the previous file.
    #[instrument(skip(self, data), fields(user_id = %abbrev_uuid(&user_id), size = data.len()), err)]
    pub async fn change_avatar(&self, user_id: UserId, data: Bytes) -> Result<UserDBResponse> {
        let avatar_config = self.avatar.clone();
        let processed = tokio::task::spawn_blocking(move || images::process_avatar(&data, &avatar_config))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn avatar processing task: {e}"),
            })??;

        let previous = self.get_profile(user_id).await?.avatar;
        let relative = images::store_avatar(&self.media_root, &processed).await?;

        let updated = match self.set_avatar(user_id, &relative).await {
            Ok(updated) => updated,
            Err(e) => {
                images::remove_avatar(&self.media_root, &relative).await;
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            images::remove_avatar(&self.media_root, &previous).await;
        }

        Ok(updated)
    }

    async fn set_avatar(&self, user_id: UserId, relative: &str) -> Result<UserDBResponse> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Ok(Users::new(&mut conn)
            .update(
                user_id,
                &UserUpdateDBRequest {
                    avatar: Some(relative.to_string()),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn update_password(&self, user_id: UserId, password_hash: String) -> Result<UserDBResponse> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Ok(Users::new(&mut conn)
            .update(
                user_id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn update_last_login(&self, user_id: UserId) -> Result<()> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        if !Users::new(&mut conn).update_last_login(user_id, Utc::now()).await? {
            debug!("Skipped last login update for missing user {}", abbrev_uuid(&user_id));
        }
        Ok(())
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Ok(Users::new(&mut conn).email_exists(email).await?)
    }
}
