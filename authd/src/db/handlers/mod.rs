//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed SQLx connection and implements the
//! [`Repository`] trait, plus whatever lookups its callers need beyond CRUD.
//!
//! # Available Repositories
//!
//! - [`Users`]: accounts, nickname allocation lookups, last-login tracking
//! - [`CaptchaChallenges`]: single-use registration challenges
//! - [`PasswordTokens`]: pending password resets, one per email
//! - [`VideoTags`]: the tag catalogue

pub mod captcha_challenges;
pub mod password_tokens;
pub mod repository;
pub mod users;
pub mod video_tags;

pub use captcha_challenges::CaptchaChallenges;
pub use password_tokens::PasswordTokens;
pub use repository::Repository;
pub use users::Users;
pub use video_tags::VideoTags;
