//! JWT access/refresh token creation and verification.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    api::models::{auth::TokenPair, users::UserPayload},
    config::Config,
    errors::Error,
    types::TokenType,
};

/// Claims of every token we issue: the user payload plus timing and the token type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub payload: UserPayload,
    pub iat: i64, // Issued at
    pub exp: i64, // Expiration time
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_expiration: Duration,
    refresh_expiration: Duration,
    leeway: Duration,
}

impl JwtService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let secret_key = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
            operation: "JWT: secret_key is required".to_string(),
        })?;
        let jwt = &config.auth.jwt;
        let algorithm = Algorithm::from_str(&jwt.algorithm).map_err(|e| Error::Internal {
            operation: format!("parse JWT algorithm {}: {e}", jwt.algorithm),
        })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
            algorithm,
            access_expiration: jwt.access_expiration,
            refresh_expiration: jwt.refresh_expiration,
            leeway: jwt.leeway,
        })
    }

    pub fn encode(&self, payload: &UserPayload, token_type: TokenType) -> Result<String, Error> {
        let now = Utc::now().timestamp();
        let lifetime = match token_type {
            TokenType::Access => self.access_expiration,
            TokenType::Refresh => self.refresh_expiration,
        };

        let claims = Claims {
            payload: payload.clone(),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            token_type,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key).map_err(|e| Error::Internal {
            operation: format!("create JWT: {e}"),
        })
    }

    /// Decode and verify a token. Any failure (expired, bad signature, malformed, other
    /// algorithm) is logged and yields `None`.
    pub fn decode(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway.as_secs();

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::warn!("Failed to decode JWT: {e}");
                None
            }
        }
    }

    pub fn create_tokens(&self, payload: &UserPayload) -> Result<TokenPair, Error> {
        Ok(TokenPair {
            access: self.encode(payload, TokenType::Access)?,
            refresh: self.encode(payload, TokenType::Refresh)?,
        })
    }
}
