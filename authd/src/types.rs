//! Common type definitions.
//!
//! - Type aliases for entity IDs ([`UserId`], [`CaptchaChallengeId`], [`PasswordTokenId`], [`VideoTagId`])
//! - [`TokenType`]: the two kinds of JWT issued by the service
//! - [`abbrev_uuid`]: abbreviate UUIDs to first 8 chars for logging
//! - [`time_delta`]: convert configured durations for timestamp arithmetic

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type CaptchaChallengeId = i64;
pub type PasswordTokenId = i64;
pub type VideoTagId = i64;

/// Lowest and highest nickname discriminator a user can be assigned.
pub const NICKNAME_NUMBER_MIN: i64 = 1;
pub const NICKNAME_NUMBER_MAX: i64 = 9999;

/// The `type` claim carried by every JWT we issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Convert a configured duration into a `chrono` delta, saturating on overflow.
pub fn time_delta(duration: std::time::Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(duration).unwrap_or(chrono::TimeDelta::MAX)
}
