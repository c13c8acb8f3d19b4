use crate::db::models::video_tags::VideoTag;
use crate::types::VideoTagId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VideoTagResponse {
    pub id: VideoTagId,
    pub name: String,
    pub slug: String,
}

impl From<VideoTag> for VideoTagResponse {
    fn from(db: VideoTag) -> Self {
        Self {
            id: db.id,
            name: db.name,
            slug: db.slug,
        }
    }
}
