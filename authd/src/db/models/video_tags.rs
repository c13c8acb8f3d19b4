//! Database models for video tags.

use crate::types::VideoTagId;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VideoTag {
    pub id: VideoTagId,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct VideoTagCreateDBRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default)]
pub struct VideoTagUpdateDBRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoTagFilter {
    pub skip: i64,
    pub limit: i64,
}

impl VideoTagFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}
