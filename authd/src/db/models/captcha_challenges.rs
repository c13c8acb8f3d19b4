//! Database models for captcha challenges.

use crate::types::CaptchaChallengeId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct CaptchaChallenge {
    pub id: CaptchaChallengeId,
    pub challenge: Uuid,
    /// The text rendered into the captcha image
    pub response: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CaptchaChallengeCreateDBRequest {
    pub challenge: Uuid,
    pub response: String,
}

#[derive(Debug, Clone, Default)]
pub struct CaptchaChallengeUpdateDBRequest {
    pub response: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptchaChallengeFilter {
    /// Only challenges created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
    pub skip: i64,
    pub limit: i64,
}
