//! Business rules sitting between the HTTP handlers and the repositories.
//!
//! - [`auth`]: registration, login, token refresh and the password flows
//! - [`captcha`]: challenge generation, rendering and verification
//! - [`images`]: avatar validation, transforms and storage
//! - [`passwords`]: hashing off the async runtime and reset secrets
//! - [`users`]: profile reads and updates, nickname numbering

pub mod auth;
pub mod captcha;
pub mod images;
pub mod passwords;
pub mod users;
