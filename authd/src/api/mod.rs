//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Auth** (`/auth/*`): registration, login, refresh, captcha, password reset and change
//! - **Profile** (`/profile/*`): the current user's profile and avatar
//! - **Tags** (`/tags/`): video tag listing
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa`. The document is served at `/openapi.json`
//! and rendered at `/docs` when the server is running.

pub mod handlers;
pub mod models;
