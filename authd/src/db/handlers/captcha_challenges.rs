//! Database repository for captcha challenges.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::captcha_challenges::{
            CaptchaChallenge, CaptchaChallengeCreateDBRequest, CaptchaChallengeFilter, CaptchaChallengeUpdateDBRequest,
        },
    },
    types::{CaptchaChallengeId, abbrev_uuid},
};

pub struct CaptchaChallenges<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for CaptchaChallenges<'c> {
    type CreateRequest = CaptchaChallengeCreateDBRequest;
    type UpdateRequest = CaptchaChallengeUpdateDBRequest;
    type Response = CaptchaChallenge;
    type Id = CaptchaChallengeId;
    type Filter = CaptchaChallengeFilter;

    #[instrument(skip(self, request), fields(challenge = %abbrev_uuid(&request.challenge)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let challenge = sqlx::query_as::<_, CaptchaChallenge>(
            r#"
            INSERT INTO captcha_challenges (challenge, response, date_created)
            VALUES (?, ?, ?)
            RETURNING id, challenge, response, date_created
            "#,
        )
        .bind(request.challenge)
        .bind(&request.response)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(challenge)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let challenge = sqlx::query_as::<_, CaptchaChallenge>(
            "SELECT id, challenge, response, date_created FROM captcha_challenges WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(challenge)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, challenge, response, date_created FROM captcha_challenges WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let challenges = query.build_query_as::<CaptchaChallenge>().fetch_all(&mut *self.db).await?;

        Ok(challenges.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, challenge, response, date_created FROM captcha_challenges");

        if let Some(created_before) = filter.created_before {
            query.push(" WHERE date_created < ").push_bind(created_before);
        }

        query
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let challenges = query.build_query_as::<CaptchaChallenge>().fetch_all(&mut *self.db).await?;
        Ok(challenges)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM captcha_challenges WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let challenge = sqlx::query_as::<_, CaptchaChallenge>(
            r#"
            UPDATE captcha_challenges
            SET response = COALESCE(?2, response)
            WHERE id = ?1
            RETURNING id, challenge, response, date_created
            "#,
        )
        .bind(id)
        .bind(&request.response)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(challenge)
    }
}

impl<'c> CaptchaChallenges<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(challenge = %abbrev_uuid(&challenge)), err)]
    pub async fn get_by_challenge(&mut self, challenge: Uuid) -> Result<Option<CaptchaChallenge>> {
        let challenge = sqlx::query_as::<_, CaptchaChallenge>(
            "SELECT id, challenge, response, date_created FROM captcha_challenges WHERE challenge = ?",
        )
        .bind(challenge)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(challenge)
    }

    /// Remove every challenge created before `cutoff`. Returns how many were removed.
    #[instrument(skip(self), err)]
    pub async fn delete_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM captcha_challenges WHERE date_created < ?")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
