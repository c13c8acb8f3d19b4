//! Database record models matching table schemas.
//!
//! These structs correspond directly to table rows and derive `sqlx::FromRow`.
//! They are kept separate from the API models in [`crate::api::models`] so that
//! storage and wire formats can change independently; conversions live next to
//! the API models.
//!
//! - [`users`]: accounts, credentials and profile preferences
//! - [`captcha_challenges`]: registration captcha challenges
//! - [`password_tokens`]: pending password resets
//! - [`video_tags`]: tags

pub mod captcha_challenges;
pub mod password_tokens;
pub mod users;
pub mod video_tags;
