//! Database repository for video tags.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::video_tags::{VideoTag, VideoTagCreateDBRequest, VideoTagFilter, VideoTagUpdateDBRequest},
    },
    types::VideoTagId,
};

pub struct VideoTags<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for VideoTags<'c> {
    type CreateRequest = VideoTagCreateDBRequest;
    type UpdateRequest = VideoTagUpdateDBRequest;
    type Response = VideoTag;
    type Id = VideoTagId;
    type Filter = VideoTagFilter;

    #[instrument(skip(self, request), fields(slug = %request.slug), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let tag = sqlx::query_as::<_, VideoTag>("INSERT INTO video_tags (name, slug) VALUES (?, ?) RETURNING id, name, slug")
            .bind(&request.name)
            .bind(&request.slug)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(tag)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let tag = sqlx::query_as::<_, VideoTag>("SELECT id, name, slug FROM video_tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(tag)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, name, slug FROM video_tags WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let tags = query.build_query_as::<VideoTag>().fetch_all(&mut *self.db).await?;

        Ok(tags.into_iter().map(|t| (t.id, t)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let tags = sqlx::query_as::<_, VideoTag>("SELECT id, name, slug FROM video_tags ORDER BY id LIMIT ? OFFSET ?")
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(tags)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM video_tags WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let tag = sqlx::query_as::<_, VideoTag>(
            r#"
            UPDATE video_tags SET
                name = COALESCE(?2, name),
                slug = COALESCE(?3, slug)
            WHERE id = ?1
            RETURNING id, name, slug
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.slug)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(tag)
    }
}

impl<'c> VideoTags<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_pool;

    fn tag(name: &str, slug: &str) -> VideoTagCreateDBRequest {
        VideoTagCreateDBRequest {
            name: name.to_string(),
            slug: slug.to_string(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_list_paginates_in_insertion_order() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = VideoTags::new(&mut conn);

        for (name, slug) in [("Music", "music"), ("Gaming", "gaming"), ("News", "news")] {
            repo.create(&tag(name, slug)).await.unwrap();
        }

        let page = repo.list(&VideoTagFilter::new(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].slug, "gaming");

        let all = repo.list(&VideoTagFilter::new(0, 100)).await.unwrap();
        assert_eq!(all.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Music", "Gaming", "News"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_name_and_slug_constraints() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = VideoTags::new(&mut conn);

        repo.create(&tag("Sport", "sport")).await.unwrap();
        let err = repo.create(&tag("Sport", "sport-2")).await.unwrap_err();
        assert!(err.is_unique_violation_on("video_tags", "name"));

        let err = repo.create(&tag(&"x".repeat(51), "long")).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }), "unexpected error: {err:?}");
    }

    #[test_log::test(tokio::test)]
    async fn test_update_delete_bulk() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = VideoTags::new(&mut conn);

        let created = repo.create(&tag("Cooking", "cooking")).await.unwrap();
        let renamed = repo
            .update(
                created.id,
                &VideoTagUpdateDBRequest {
                    name: Some("Baking".to_string()),
                    slug: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Baking");
        assert_eq!(renamed.slug, "cooking");

        let bulk = repo.get_bulk(vec![created.id]).await.unwrap();
        assert_eq!(bulk.get(&created.id), Some(&renamed));

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
