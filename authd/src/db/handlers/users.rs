//! Database repository for users.

use std::collections::HashMap;

use crate::types::{UserId, abbrev_uuid};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::users::{User, UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, nickname, nickname_number, avatar, is_staff, is_active, is_superuser, \
     is_premium, is_censorship_enabled, is_language_english, is_thumbnail_modern, last_login, date_created, date_updated";

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(nickname = %request.nickname, nickname_number = request.nickname_number), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, nickname, nickname_number, is_staff, is_superuser, date_created, date_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(&request.nickname)
        .bind(request.nickname_number)
        .bind(request.is_staff)
        .bind(request.is_superuser)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<Self::Id, UserDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let users = query.build_query_as::<User>().fetch_all(&mut *self.db).await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY date_created DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE(?2, email),
                password_hash = COALESCE(?3, password_hash),
                nickname = COALESCE(?4, nickname),
                nickname_number = COALESCE(?5, nickname_number),
                avatar = COALESCE(?6, avatar),
                is_staff = COALESCE(?7, is_staff),
                is_active = COALESCE(?8, is_active),
                is_superuser = COALESCE(?9, is_superuser),
                is_premium = COALESCE(?10, is_premium),
                is_censorship_enabled = COALESCE(?11, is_censorship_enabled),
                is_language_english = COALESCE(?12, is_language_english),
                is_thumbnail_modern = COALESCE(?13, is_thumbnail_modern),
                date_updated = ?14
            WHERE id = ?1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(&request.nickname)
        .bind(request.nickname_number)
        .bind(&request.avatar)
        .bind(request.is_staff)
        .bind(request.is_active)
        .bind(request.is_superuser)
        .bind(request.is_premium)
        .bind(request.is_censorship_enabled)
        .bind(request.is_language_english)
        .bind(request.is_thumbnail_modern)
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Look a user up by email. Callers are expected to pass the normalised (lowercase) form.
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn email_exists(&mut self, email: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
            .bind(email)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists)
    }

    /// Nickname numbers already in use for `nickname`.
    #[instrument(skip(self), err)]
    pub async fn taken_nickname_numbers(&mut self, nickname: &str) -> Result<Vec<i64>> {
        let numbers = sqlx::query_scalar("SELECT nickname_number FROM users WHERE nickname = ?")
            .bind(nickname)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(numbers)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_last_login(&mut self, id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
