use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::users::{ProfileAndPayloadResponse, ProfileResponse, ProfileUpdate, UserPayload},
    db::models::users::UserDBResponse,
    errors::{Error, ErrorBody},
    services::users::UserService,
};

/// Multipart field carrying the avatar upload.
pub const AVATAR_FIELD: &str = "avatar";

fn profile_and_payload(state: &AppState, user: UserDBResponse) -> ProfileAndPayloadResponse {
    let payload = UserPayload::from(&user);
    ProfileAndPayloadResponse {
        profile: ProfileResponse::from_db(user, &state.config.media.url_path),
        payload,
    }
}

/// Get the current user's profile
#[utoipa::path(
    get,
    path = "/profile/",
    tag = "profile",
    responses(
        (status = 200, description = "Current user's profile", body = ProfileResponse),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 403, description = "No bearer token", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(State(state): State<AppState>, current_user: UserPayload) -> Result<Json<ProfileResponse>, Error> {
    let user = UserService::new(&state).get_profile(current_user.id).await?;
    Ok(Json(ProfileResponse::from_db(user, &state.config.media.url_path)))
}

/// Update nickname, email or display preferences
#[utoipa::path(
    patch,
    path = "/profile/",
    request_body = ProfileUpdate,
    tag = "profile",
    responses(
        (status = 200, description = "Updated profile and refreshed payload", body = ProfileAndPayloadResponse),
        (status = 400, description = "Email taken or no free nickname number", body = ErrorBody),
        (status = 422, description = "Nickname failed validation", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn patch_profile(
    State(state): State<AppState>,
    current_user: UserPayload,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileAndPayloadResponse>, Error> {
    let user = UserService::new(&state).patch_profile(current_user.id, update).await?;
    Ok(Json(profile_and_payload(&state, user)))
}

/// Upload a new avatar
///
/// Accepts a multipart form with an `avatar` file. Still images are stored as WebP,
/// animated GIFs keep their frames.
#[utoipa::path(
    put,
    path = "/profile/avatar/",
    tag = "profile",
    request_body(content_type = "multipart/form-data", description = "Form with an `avatar` file field"),
    responses(
        (status = 200, description = "Updated profile and refreshed payload", body = ProfileAndPayloadResponse),
        (status = 400, description = "Missing file, too big, or not an image", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_avatar(
    State(state): State<AppState>,
    current_user: UserPayload,
    mut multipart: Multipart,
) -> Result<Json<ProfileAndPayloadResponse>, Error> {
    let max_size = state.config.media.avatar.max_size;
    let too_big = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::AvatarTooBig {
                max_mb: max_size / (1024 * 1024),
            }
        } else {
            Error::BadRequest {
                message: format!("Invalid multipart data: {}", e.body_text()),
            }
        }
    };

    let mut data = None;
    while let Some(field) = multipart.next_field().await.map_err(too_big)? {
        if field.name() == Some(AVATAR_FIELD) {
            data = Some(field.bytes().await.map_err(too_big)?);
            break;
        }
    }

    let data = data.ok_or_else(|| Error::BadRequest {
        message: "No avatar file provided".to_string(),
    })?;

    let user = UserService::new(&state).change_avatar(current_user.id, data).await?;
    Ok(Json(profile_and_payload(&state, user)))
}
