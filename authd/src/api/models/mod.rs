//! API request and response data models.
//!
//! These structures define the public JSON contract. Field names are camelCase on the wire.
//! API models are kept separate from the database models in [`crate::db::models`] so the
//! storage representation can change without breaking clients, and every model is annotated
//! with `utoipa` for the generated OpenAPI document.
//!
//! - [`auth`]: registration, login, token refresh and password change payloads
//! - [`captcha`]: captcha challenges and submitted solutions
//! - [`users`]: the token payload, profile views and profile updates
//! - [`tags`]: video tags
//! - [`pagination`]: `skip`/`limit` query parameters
//! - [`responses`]: small shared response bodies

pub mod auth;
pub mod captcha;
pub mod pagination;
pub mod responses;
pub mod tags;
pub mod users;
