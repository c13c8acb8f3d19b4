//! Database repository for password reset tokens.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::password_tokens::{PasswordToken, PasswordTokenCreateDBRequest, PasswordTokenFilter, PasswordTokenUpdateDBRequest},
    },
    types::PasswordTokenId,
};

const TOKEN_COLUMNS: &str = "id, email, token_hash, new_password_hash, date_created, date_updated";

pub struct PasswordTokens<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for PasswordTokens<'c> {
    type CreateRequest = PasswordTokenCreateDBRequest;
    type UpdateRequest = PasswordTokenUpdateDBRequest;
    type Response = PasswordToken;
    type Id = PasswordTokenId;
    type Filter = PasswordTokenFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, PasswordToken>(&format!(
            r#"
            INSERT INTO password_tokens (email, token_hash, new_password_hash, date_created, date_updated)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(&request.email)
        .bind(&request.token_hash)
        .bind(&request.new_password_hash)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let token = sqlx::query_as::<_, PasswordToken>(&format!("SELECT {TOKEN_COLUMNS} FROM password_tokens WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {TOKEN_COLUMNS} FROM password_tokens WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let tokens = query.build_query_as::<PasswordToken>().fetch_all(&mut *self.db).await?;

        Ok(tokens.into_iter().map(|t| (t.id, t)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {TOKEN_COLUMNS} FROM password_tokens"));

        if let Some(email) = &filter.email {
            query.push(" WHERE email = ").push_bind(email.clone());
        }

        query
            .push(" ORDER BY date_updated DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let tokens = query.build_query_as::<PasswordToken>().fetch_all(&mut *self.db).await?;
        Ok(tokens)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, PasswordToken>(&format!(
            r#"
            UPDATE password_tokens SET
                token_hash = COALESCE(?2, token_hash),
                new_password_hash = COALESCE(?3, new_password_hash),
                date_updated = ?4
            WHERE id = ?1
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.token_hash)
        .bind(&request.new_password_hash)
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(token)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM password_tokens WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> PasswordTokens<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Insert a pending reset for `request.email`, replacing any earlier one for the same address.
    #[instrument(skip(self, request), err)]
    pub async fn upsert_for_email(&mut self, request: &PasswordTokenCreateDBRequest) -> Result<PasswordToken> {
        let token = sqlx::query_as::<_, PasswordToken>(&format!(
            r#"
            INSERT INTO password_tokens (email, token_hash, new_password_hash, date_created, date_updated)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (email) DO UPDATE SET
                token_hash = excluded.token_hash,
                new_password_hash = excluded.new_password_hash,
                date_updated = excluded.date_updated
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(&request.email)
        .bind(&request.token_hash)
        .bind(&request.new_password_hash)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self, token_hash), err)]
    pub async fn get_by_token_hash(&mut self, token_hash: &str) -> Result<Option<PasswordToken>> {
        let token = sqlx::query_as::<_, PasswordToken>(&format!("SELECT {TOKEN_COLUMNS} FROM password_tokens WHERE token_hash = ?"))
            .bind(token_hash)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }
}
