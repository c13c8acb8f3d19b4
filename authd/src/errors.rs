use crate::db::errors::DbError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No bearer credentials, or an authorization scheme other than `Bearer`
    #[error("{}", .message.as_deref().unwrap_or("Credentials were not provided."))]
    Unauthorized { message: Option<String> },

    /// Credentials were presented but did not check out
    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// Request body failed field validation
    #[error("{message}")]
    Validation { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Rate limit exceeded
    #[error("{message}")]
    TooManyRequests { message: String },

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Invalid email: {reason}")]
    InvalidEmail { reason: String },

    #[error("Invalid captcha")]
    InvalidCaptcha,

    #[error("No free number available for this nickname")]
    NoFreeNickname,

    #[error("Invalid token")]
    InvalidPasswordToken,

    #[error("Invalid old password")]
    InvalidOldPassword,

    #[error("Avatar is too big. Max size is {max_mb}MB")]
    AvatarTooBig { max_mb: u64 },

    #[error("File is not an image")]
    InvalidImage,

    #[error("Email already exists")]
    EmailAlreadyExists,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `REGISTER_USER_ALREADY_EXISTS`
    pub error: String,
    /// Human-readable description
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::BadRequest { .. }
            | Error::UserAlreadyExists
            | Error::InvalidEmail { .. }
            | Error::InvalidCaptcha
            | Error::NoFreeNickname
            | Error::InvalidPasswordToken
            | Error::InvalidOldPassword
            | Error::AvatarTooBig { .. }
            | Error::InvalidImage
            | Error::EmailAlreadyExists => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code placed in the `error` field of the response body
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::InvalidCredentials => "LOGIN_BAD_CREDENTIALS",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::TooManyRequests { .. } => "RATE_LIMIT",
            Error::UserAlreadyExists => "REGISTER_USER_ALREADY_EXISTS",
            Error::InvalidEmail { .. } => "REGISTER_INVALID_EMAIL",
            Error::InvalidCaptcha => "INVALID_CAPTCHA",
            Error::NoFreeNickname => "NO_FREE_NICKNAME",
            Error::InvalidPasswordToken => "NEW_PASSWORD_INVALID_TOKEN",
            Error::InvalidOldPassword => "CHANGE_PASSWORD_INVALID_OLD_PASSWORD",
            Error::AvatarTooBig { .. } => "AVATAR_TOO_BIG",
            Error::InvalidImage => "INVALID_IMAGE",
            Error::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            Error::Database(DbError::NotFound) => "NOT_FOUND",
            Error::Database(DbError::UniqueViolation { .. }) => "CONFLICT",
            Error::Database(DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. }) => "BAD_REQUEST",
            Error::Internal { .. } | Error::Database(DbError::Other(_)) | Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "The requested resource was not found.".to_string(),
                DbError::UniqueViolation { table, columns, .. } => match (table.as_deref(), columns.as_deref()) {
                    (Some("users"), Some("email")) => "Email already exists".to_string(),
                    (Some("video_tags"), Some(c)) => format!("A tag with this {c} already exists"),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthorized { .. } | Error::InvalidCredentials => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::TooManyRequests { .. } => {
                tracing::info!("Rate limited: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.user_message(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_codes_and_statuses() {
        let cases = [
            (Error::UserAlreadyExists, StatusCode::BAD_REQUEST, "REGISTER_USER_ALREADY_EXISTS"),
            (Error::InvalidCaptcha, StatusCode::BAD_REQUEST, "INVALID_CAPTCHA"),
            (Error::InvalidCredentials, StatusCode::UNAUTHORIZED, "LOGIN_BAD_CREDENTIALS"),
            (Error::Unauthorized { message: None }, StatusCode::FORBIDDEN, "UNAUTHORIZED"),
            (
                Error::TooManyRequests {
                    message: "Too many requests".to_string(),
                },
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT",
            ),
            (Error::InvalidOldPassword, StatusCode::BAD_REQUEST, "CHANGE_PASSWORD_INVALID_OLD_PASSWORD"),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let error = Error::Internal {
            operation: "talk to the secret backend at 10.0.0.1".to_string(),
        };
        assert_eq!(error.user_message(), "Internal server error");
        assert_eq!(error.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_avatar_too_big_message() {
        assert_eq!(Error::AvatarTooBig { max_mb: 10 }.user_message(), "Avatar is too big. Max size is 10MB");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = Error::InvalidPasswordToken.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "NEW_PASSWORD_INVALID_TOKEN");
        assert_eq!(body.message, "Invalid token");
    }
}
