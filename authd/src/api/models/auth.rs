//! API request/response models for registration, login, tokens and passwords.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{captcha::CaptchaVerify, users::UserPayload};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "email": "user@example.com",
    "nickname": "Nick",
    "password": "Pass12345",
    "passwordRepeat": "Pass12345",
    "captcha": {"challenge": "325a81b4-ad65-4cdc-b965-a6fa4f30200a", "response": "loremipsum"}
}))]
pub struct RegisterRequest {
    pub email: String,
    /// Letters, numbers and spaces, 4 to 20 characters
    pub nickname: String,
    /// 8 to 30 characters with a lowercase letter, an uppercase letter and a number
    pub password: String,
    pub password_repeat: String,
    pub captcha: CaptchaVerify,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"email": "user@example.com", "password": "Pass12345"}))]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub password: String,
    pub password_repeat: String,
}

/// An access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Payload fields at the top level, plus the issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub payload: UserPayload,
    pub tokens: TokenPair,
}
