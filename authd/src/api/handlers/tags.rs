use axum::{
    Json,
    extract::{Query, State},
};
use tracing::debug;

use crate::{
    AppState,
    api::models::{pagination::Pagination, tags::VideoTagResponse},
    db::{
        errors::DbError,
        handlers::{Repository, VideoTags},
        models::video_tags::VideoTagFilter,
    },
    errors::Error,
};

/// Cache namespace for tag listings.
pub const TAGS_CACHE_NAMESPACE: &str = "tags";

/// List video tags
#[utoipa::path(
    get,
    path = "/tags/",
    tag = "tags",
    params(Pagination),
    responses(
        (status = 200, description = "Video tags in creation order", body = [VideoTagResponse]),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_tags(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> Result<Json<Vec<VideoTagResponse>>, Error> {
    let (skip, limit) = pagination.params();
    let key = format!("{skip}:{limit}");

    if let Some(cached) = state.cache.get::<Vec<VideoTagResponse>>(TAGS_CACHE_NAMESPACE, &key).await {
        debug!("Serving tags from cache");
        return Ok(Json(cached));
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let tags: Vec<VideoTagResponse> = VideoTags::new(&mut conn)
        .list(&VideoTagFilter::new(skip, limit))
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    state
        .cache
        .set(TAGS_CACHE_NAMESPACE, &key, &tags, state.config.cache.tags_ttl)
        .await;

    Ok(Json(tags))
}
