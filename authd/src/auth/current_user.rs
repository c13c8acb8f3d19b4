//! Bearer-token extractor for the authenticated user.

use crate::{
    AppState,
    api::models::users::UserPayload,
    errors::{Error, Result},
    types::{TokenType, abbrev_uuid},
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{instrument, trace};

/// Pull the bearer credentials out of the `Authorization` header.
///
/// Returns:
/// - Err(Unauthorized): header missing, unreadable, or not using the `Bearer` scheme
/// - Ok(token): the raw token after the scheme
fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(Error::Unauthorized { message: None })?
        .to_str()
        .map_err(|_| Error::Unauthorized {
            message: Some("Invalid authentication format".to_string()),
        })?;

    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(Error::Unauthorized {
            message: Some("Invalid authentication format".to_string()),
        }),
    }
}

impl FromRequestParts<AppState> for UserPayload {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(parts)?;

        let claims = state.jwt.decode(token).ok_or(Error::InvalidCredentials)?;
        if claims.token_type != TokenType::Access {
            trace!("Rejected {} token on an access-protected route", claims.token_type);
            return Err(Error::InvalidCredentials);
        }

        trace!("Authenticated user {}", abbrev_uuid(&claims.payload.id));
        Ok(claims.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_state, create_test_user};
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/profile/");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test_log::test(tokio::test)]
    async fn test_valid_access_token() {
        let (state, _dir) = create_test_state().await;
        let user = create_test_user(&state.db, "extract@example.com", "Pass12345").await;
        let payload = UserPayload::from(&user);
        let tokens = state.jwt.create_tokens(&payload).unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {}", tokens.access)));
        let extracted = UserPayload::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted, payload);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_header_is_unauthorized() {
        let (state, _dir) = create_test_state().await;

        let mut parts = parts_with_auth(None);
        let err = UserPayload::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { message: None }));
    }

    #[test_log::test(tokio::test)]
    async fn test_wrong_scheme_is_unauthorized() {
        let (state, _dir) = create_test_state().await;

        for value in ["Basic dXNlcjpwYXNz", "Bearer", "token-without-scheme"] {
            let mut parts = parts_with_auth(Some(value));
            let err = UserPayload::from_request_parts(&mut parts, &state).await.unwrap_err();
            assert_eq!(err.to_string(), "Invalid authentication format", "for {value}");
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_token_rejected() {
        let (state, _dir) = create_test_state().await;
        let user = create_test_user(&state.db, "refresh-only@example.com", "Pass12345").await;
        let tokens = state.jwt.create_tokens(&UserPayload::from(&user)).unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {}", tokens.refresh)));
        let err = UserPayload::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[test_log::test(tokio::test)]
    async fn test_garbage_token_is_invalid_credentials() {
        let (state, _dir) = create_test_state().await;

        let mut parts = parts_with_auth(Some("Bearer not.a.jwt"));
        let err = UserPayload::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }
}
