//! OpenAPI documentation for the HTTP API.
//!
//! [`ApiDoc`] is served as JSON at `/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, errors::ErrorBody, types::TokenType};

/// Bearer JWT scheme referenced by the protected endpoints.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from login, registration or refresh. Include it in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer ACCESS_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "authd", description = "Accounts, JWT authentication, profiles and tags"),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::auth::request_new_password,
        api::handlers::auth::confirm_new_password,
        api::handlers::auth::captcha,
        api::handlers::auth::change_password,
        api::handlers::profile::get_profile,
        api::handlers::profile::patch_profile,
        api::handlers::profile::change_avatar,
        api::handlers::tags::list_tags,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::RefreshRequest,
            api::models::auth::ChangePasswordRequest,
            api::models::auth::TokenPair,
            api::models::auth::AuthResponse,
            api::models::captcha::CaptchaChallengeResponse,
            api::models::captcha::CaptchaVerify,
            api::models::users::UserPayload,
            api::models::users::ProfileResponse,
            api::models::users::ProfileUpdate,
            api::models::users::ProfileAndPayloadResponse,
            api::models::tags::VideoTagResponse,
            api::models::responses::MessageResponse,
            ErrorBody,
            TokenType,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login, tokens, captcha and passwords"),
        (name = "profile", description = "The current user's profile and avatar"),
        (name = "tags", description = "Video tags"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for path in [
            "/auth/register/",
            "/auth/login/",
            "/auth/refresh/",
            "/auth/request-new-password/{email}/",
            "/auth/confirm-new-password/{token}/",
            "/auth/captcha/",
            "/auth/change-password/",
            "/profile/",
            "/profile/avatar/",
            "/tags/",
        ] {
            assert!(paths.contains(&path), "missing {path}");
        }
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("BearerAuth"));
    }
}
