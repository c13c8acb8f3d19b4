//! HTTP request handlers for all API endpoints.
//!
//! Handlers deserialize the request, resolve the current user where needed, and hand off to
//! [`crate::services`]. Errors are returned as [`crate::errors::Error`], which renders the
//! status code and `{error, message}` body.
//!
//! - [`auth`]: registration, login, token refresh, captcha and the password flows
//! - [`profile`]: reading and updating the current user's profile and avatar
//! - [`tags`]: the cached video tag listing
//!
//! # Authentication
//!
//! Protected handlers take a [`crate::api::models::users::UserPayload`] argument; its extractor
//! in [`crate::auth::current_user`] requires a valid `Bearer` access token.

pub mod auth;
pub mod profile;
pub mod tags;
