//! API models for captcha challenges.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A freshly generated challenge with its rendered PNG.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaChallengeResponse {
    pub challenge: String,
    /// Base64-encoded PNG image
    pub image_base64: String,
}

/// A solution submitted with a registration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaptchaVerify {
    pub challenge: String,
    pub response: String,
}
