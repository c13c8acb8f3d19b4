//! Authentication primitives.
//!
//! Clients authenticate with a JWT in the `Authorization: Bearer <token>` header. Two kinds
//! of token are issued on register, login and password-reset confirmation:
//!
//! - **access** tokens, short-lived, accepted by protected routes
//! - **refresh** tokens, long-lived, accepted only by `/auth/refresh/` to obtain a new pair
//!
//! Both carry the full [`UserPayload`](crate::api::models::users::UserPayload) so handlers
//! can act on the caller without a database round trip. Tokens are stateless; nothing is
//! persisted server-side.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor producing the authenticated [`UserPayload`](crate::api::models::users::UserPayload)
//! - [`jwt`]: Token encoding and verification
//! - [`password`]: Argon2 hashing, strength rules and reset token helpers
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use authd::api::models::users::UserPayload;
//!
//! async fn protected_handler(current_user: UserPayload) -> String {
//!     format!("Hello, {}#{}!", current_user.nickname, current_user.nickname_number)
//! }
//! ```

pub mod current_user;
pub mod jwt;
pub mod password;
