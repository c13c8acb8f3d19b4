use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, TokenPair},
        captcha::CaptchaChallengeResponse,
        responses::MessageResponse,
        users::UserPayload,
    },
    errors::{Error, ErrorBody},
    services::{
        auth::{AuthService, NEW_PASSWORD_REQUESTED_MESSAGE},
        captcha::CaptchaService,
    },
};

/// Register a new user account
#[utoipa::path(
    post,
    path = "/auth/register/",
    request_body = RegisterRequest,
    tag = "auth",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Email taken, invalid email or captcha, or no free nickname number", body = ErrorBody),
        (status = 422, description = "Nickname or password failed validation", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<(StatusCode, Json<AuthResponse>), Error> {
    let response = AuthService::new(&state).register_user(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login/",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<AuthResponse>, Error> {
    Ok(Json(AuthService::new(&state).login(request).await?))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh/",
    request_body = RefreshRequest,
    tag = "auth",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, expired or non-refresh token", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, Json(request): Json<RefreshRequest>) -> Result<Json<TokenPair>, Error> {
    Ok(Json(AuthService::new(&state).refresh_tokens(&request.refresh).await?))
}

/// Email a new password and a link to activate it
///
/// The response is the same whether or not the email belongs to an account.
#[utoipa::path(
    post,
    path = "/auth/request-new-password/{email}/",
    tag = "auth",
    params(("email" = String, Path, description = "Account email address")),
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 429, description = "Too many requests", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_new_password(State(state): State<AppState>, Path(email): Path<String>) -> Json<MessageResponse> {
    // Runs in the background so response time does not reveal whether the account exists
    drop(AuthService::new(&state).request_new_password(&email));
    Json(MessageResponse::new(NEW_PASSWORD_REQUESTED_MESSAGE))
}

/// Activate an emailed password
#[utoipa::path(
    post,
    path = "/auth/confirm-new-password/{token}/",
    tag = "auth",
    params(("token" = String, Path, description = "Token from the password reset email")),
    responses(
        (status = 200, description = "Password activated, user logged in", body = AuthResponse),
        (status = 400, description = "Unknown or expired token", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_new_password(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<AuthResponse>, Error> {
    Ok(Json(AuthService::new(&state).confirm_new_password(&token).await?))
}

/// Generate a captcha challenge
#[utoipa::path(
    get,
    path = "/auth/captcha/",
    tag = "auth",
    responses(
        (status = 201, description = "Challenge created", body = CaptchaChallengeResponse),
        (status = 429, description = "Too many requests", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn captcha(State(state): State<AppState>) -> Result<(StatusCode, Json<CaptchaChallengeResponse>), Error> {
    let challenge = CaptchaService::new(&state).create_challenge().await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// Change the current user's password
#[utoipa::path(
    post,
    path = "/auth/change-password/",
    request_body = ChangePasswordRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Old password is wrong", body = ErrorBody),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 403, description = "No bearer token", body = ErrorBody),
        (status = 422, description = "New password failed validation", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: UserPayload,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, Error> {
    Ok(Json(AuthService::new(&state).change_password(current_user.id, request).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::models::auth::{AuthResponse, TokenPair};
    use crate::api::models::captcha::CaptchaChallengeResponse;
    use crate::api::models::responses::MessageResponse;
    use crate::api::models::users::UserPayload;
    use crate::errors::ErrorBody;
    use crate::test_utils::{bearer, create_test_app, create_test_user};
    use axum::http::StatusCode;
    use serde_json::json;

    fn register_body(email: &str, bypass: &str) -> serde_json::Value {
        json!({
            "email": email,
            "nickname": "Tester",
            "password": "Pass12345",
            "passwordRepeat": "Pass12345",
            "captcha": {"challenge": "00000000-0000-0000-0000-000000000000", "response": bypass},
        })
    }

    #[test_log::test(tokio::test)]
    async fn test_register_returns_payload_and_tokens() {
        let (server, state, _dir) = create_test_app().await;
        let bypass = state.config.auth.captcha.super_response.clone().unwrap();

        let response = server.post("/auth/register/").json(&register_body("new@example.com", &bypass)).await;
        response.assert_status(StatusCode::CREATED);

        let body: serde_json::Value = response.json();
        assert_eq!(body["email"], "new@example.com");
        assert_eq!(body["nickname"], "Tester");
        assert!(body["nicknameNumber"].as_i64().is_some());
        assert!(body["tokens"]["access"].as_str().is_some());
        assert!(body["tokens"]["refresh"].as_str().is_some());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_duplicate_email() {
        let (server, state, _dir) = create_test_app().await;
        let bypass = state.config.auth.captcha.super_response.clone().unwrap();
        create_test_user(&state.db, "dup@example.com", "Pass12345").await;

        let response = server.post("/auth/register/").json(&register_body("dup@example.com", &bypass)).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "REGISTER_USER_ALREADY_EXISTS");
    }

    #[test_log::test(tokio::test)]
    async fn test_register_invalid_captcha() {
        let (server, _state, _dir) = create_test_app().await;

        let response = server.post("/auth/register/").json(&register_body("cap@example.com", "WRONG")).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "INVALID_CAPTCHA");
    }

    #[test_log::test(tokio::test)]
    async fn test_login_and_bad_credentials() {
        let (server, state, _dir) = create_test_app().await;
        create_test_user(&state.db, "login@example.com", "Pass12345").await;

        let response = server
            .post("/auth/login/")
            .json(&json!({"email": "login@example.com", "password": "Pass12345"}))
            .await;
        response.assert_status_ok();
        let body: AuthResponse = response.json();
        assert_eq!(body.payload.email, "login@example.com");

        let response = server
            .post("/auth/login/")
            .json(&json!({"email": "login@example.com", "password": "Nope12345"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "LOGIN_BAD_CREDENTIALS");
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_rejects_access_token() {
        let (server, state, _dir) = create_test_app().await;
        let user = create_test_user(&state.db, "refresh@example.com", "Pass12345").await;
        let tokens = state.jwt.create_tokens(&UserPayload::from(&user)).unwrap();

        let response = server.post("/auth/refresh/").json(&json!({"refresh": tokens.refresh})).await;
        response.assert_status_ok();
        let pair: TokenPair = response.json();
        assert!(state.jwt.decode(&pair.access).is_some());

        let response = server.post("/auth/refresh/").json(&json!({"refresh": tokens.access})).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_request_new_password_does_not_leak_existence() {
        let (server, state, _dir) = create_test_app().await;
        create_test_user(&state.db, "exists@example.com", "Pass12345").await;

        let known = server.post("/auth/request-new-password/exists@example.com/").await;
        let unknown = server.post("/auth/request-new-password/ghost@example.com/").await;

        known.assert_status_ok();
        unknown.assert_status_ok();
        assert_eq!(known.json::<MessageResponse>(), unknown.json::<MessageResponse>());
    }

    #[test_log::test(tokio::test)]
    async fn test_confirm_new_password_invalid_token() {
        let (server, _state, _dir) = create_test_app().await;

        let response = server.post("/auth/confirm-new-password/not-a-token/").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "NEW_PASSWORD_INVALID_TOKEN");
    }

    #[test_log::test(tokio::test)]
    async fn test_captcha_challenge() {
        let (server, _state, _dir) = create_test_app().await;

        let response = server.get("/auth/captcha/").await;
        response.assert_status(StatusCode::CREATED);
        let body: CaptchaChallengeResponse = response.json();
        assert!(uuid::Uuid::parse_str(&body.challenge).is_ok());
        assert!(!body.image_base64.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_change_password() {
        let (server, state, _dir) = create_test_app().await;
        let user = create_test_user(&state.db, "change@example.com", "Pass12345").await;
        let (name, value) = bearer(&state, &user);

        let response = server
            .post("/auth/change-password/")
            .add_header(name, &value)
            .json(&json!({"oldPassword": "Wrong12345", "password": "NewPass123", "passwordRepeat": "NewPass123"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorBody>().error, "CHANGE_PASSWORD_INVALID_OLD_PASSWORD");

        let response = server
            .post("/auth/change-password/")
            .add_header(name, &value)
            .json(&json!({"oldPassword": "Pass12345", "password": "NewPass123", "passwordRepeat": "NewPass123"}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<MessageResponse>().message, "Password changed successfully.");
    }

    #[test_log::test(tokio::test)]
    async fn test_change_password_requires_bearer() {
        let (server, _state, _dir) = create_test_app().await;

        let response = server
            .post("/auth/change-password/")
            .json(&json!({"oldPassword": "Pass12345", "password": "NewPass123", "passwordRepeat": "NewPass123"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post("/auth/change-password/")
            .add_header("Authorization", "Token abc")
            .json(&json!({"oldPassword": "Pass12345", "password": "NewPass123", "passwordRepeat": "NewPass123"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<ErrorBody>().message, "Invalid authentication format");
    }
}
