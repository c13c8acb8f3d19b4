//! Registration, login, token refresh and the password flows.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, TokenPair},
        responses::MessageResponse,
        users::UserPayload,
    },
    db::{
        errors::DbError,
        handlers::{CaptchaChallenges, PasswordTokens, Repository, Users},
        models::{
            password_tokens::PasswordTokenCreateDBRequest,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    errors::{Error, Result},
    services::{
        captcha::CaptchaService,
        passwords::PasswordService,
        users::{UserService, allocate_nickname_number, normalize_email, validate_nickname},
    },
    types::{TokenType, UserId, abbrev_uuid, time_delta},
};

pub const PASSWORD_CHANGED_MESSAGE: &str = "Password changed successfully.";
pub const NEW_PASSWORD_REQUESTED_MESSAGE: &str = "If an account exists for this email, a new password has been sent to it.";

pub struct AuthService {
    state: AppState,
    passwords: PasswordService,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            state: state.clone(),
            passwords: PasswordService::new(state),
        }
    }

    fn db(&self) -> &SqlitePool {
        &self.state.db
    }

    fn respond(&self, user: &UserDBResponse) -> Result<AuthResponse> {
        let payload = UserPayload::from(user);
        let tokens = self.state.jwt.create_tokens(&payload)?;
        Ok(AuthResponse { payload, tokens })
    }

    /// Record a login time without holding up the response.
    fn spawn_last_login_update(&self, user_id: UserId) -> JoinHandle<()> {
        let users = UserService::new(&self.state);
        tokio::spawn(async move {
            if let Err(e) = users.update_last_login(user_id).await {
                warn!("Failed to update last login for {}: {e}", abbrev_uuid(&user_id));
            }
        })
    }

    #[instrument(skip_all, err)]
    pub async fn register_user(&self, request: RegisterRequest) -> Result<AuthResponse> {
        let email = normalize_email(&request.email)?;
        validate_nickname(&request.nickname)?;
        self.passwords.check_new_password(&request.password, &request.password_repeat)?;

        if UserService::new(&self.state).email_exists(&email).await? {
            return Err(Error::UserAlreadyExists);
        }

        let verification = CaptchaService::new(&self.state)
            .verify(&request.captcha.challenge, &request.captcha.response)
            .await?;
        if !verification.valid {
            return Err(Error::InvalidCaptcha);
        }

        let password_hash = self.passwords.hash(&request.password).await?;

        let mut tx = self.db().begin().await.map_err(DbError::from)?;
        let nickname_number = allocate_nickname_number(&mut tx, &request.nickname).await?;

        let user = Users::new(&mut tx)
            .create(&UserCreateDBRequest {
                email,
                password_hash,
                nickname: request.nickname,
                nickname_number,
                is_staff: false,
                is_superuser: false,
            })
            .await
            .map_err(|e| {
                if e.is_unique_violation_on("users", "email") {
                    Error::UserAlreadyExists
                } else {
                    Error::Database(e)
                }
            })?;

        if let Some(challenge) = verification.challenge {
            CaptchaChallenges::new(&mut tx).delete(challenge.id).await?;
        }
        tx.commit().await.map_err(DbError::from)?;

        info!("Registered user {} as {}#{}", abbrev_uuid(&user.id), user.nickname, user.nickname_number);
        self.respond(&user)
    }

    #[instrument(skip_all, err)]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let email = request.email.trim().to_lowercase();

        let mut conn = self.db().acquire().await.map_err(DbError::from)?;
        let user = Users::new(&mut conn)
            .get_user_by_email(&email)
            .await?
            .ok_or(Error::InvalidCredentials)?;
        drop(conn);

        if !self.passwords.verify(&request.password, &user.password_hash).await? {
            return Err(Error::InvalidCredentials);
        }
        if !user.is_active {
            debug!("Rejected login for inactive user {}", abbrev_uuid(&user.id));
            return Err(Error::InvalidCredentials);
        }

        self.spawn_last_login_update(user.id);
        self.respond(&user)
    }

    /// Exchange a refresh token for a new pair built from the current user row.
    #[instrument(skip_all, err)]
    pub async fn refresh_tokens(&self, refresh: &str) -> Result<TokenPair> {
        let claims = self.state.jwt.decode(refresh).ok_or(Error::InvalidCredentials)?;
        if claims.token_type != TokenType::Refresh {
            debug!("Refresh attempted with a {} token", claims.token_type);
            return Err(Error::InvalidCredentials);
        }

        let mut conn = self.db().acquire().await.map_err(DbError::from)?;
        let user = Users::new(&mut conn)
            .get_by_id(claims.payload.id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(Error::InvalidCredentials)?;

        self.spawn_last_login_update(user.id);
        self.state.jwt.create_tokens(&UserPayload::from(&user))
    }

    /// Start a password reset in the background. The caller always gets the same answer,
    /// whether or not the email belongs to an account.
    pub fn request_new_password(&self, email: &str) -> JoinHandle<()> {
        let email = email.trim().to_lowercase();
        let service = Self::new(&self.state);

        tokio::spawn(async move {
            if let Err(e) = service.send_new_password(&email).await {
                error!("Failed to process password reset request: {e:#}");
            }
        })
    }

    #[instrument(skip_all, err)]
    async fn send_new_password(&self, email: &str) -> Result<()> {
        let mut conn = self.db().acquire().await.map_err(DbError::from)?;
        let Some(user) = Users::new(&mut conn).get_user_by_email(email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };
        drop(conn);

        let secrets = self.passwords.generate_reset();
        let new_password_hash = self.passwords.hash(&secrets.new_password).await?;

        let mut conn = self.db().acquire().await.map_err(DbError::from)?;
        PasswordTokens::new(&mut conn)
            .upsert_for_email(&PasswordTokenCreateDBRequest {
                email: user.email.clone(),
                token_hash: secrets.token_hash,
                new_password_hash,
            })
            .await?;
        drop(conn);

        self.state
            .mailer
            .send_new_password_email(&user.email, Some(&user.nickname), &secrets.new_password, &secrets.token)
            .await?;

        info!("Sent password reset email to user {}", abbrev_uuid(&user.id));
        Ok(())
    }

    /// Activate the password issued with `token` and sign the user in.
    #[instrument(skip_all, err)]
    pub async fn confirm_new_password(&self, token: &str) -> Result<AuthResponse> {
        let token_hash = self.passwords.hash_token(token);
        let lifetime = time_delta(self.state.config.auth.password_reset.token_lifetime);

        let mut tx = self.db().begin().await.map_err(DbError::from)?;
        let stored = PasswordTokens::new(&mut tx)
            .get_by_token_hash(&token_hash)
            .await?
            .filter(|stored| Utc::now() - stored.date_updated <= lifetime)
            .ok_or(Error::InvalidPasswordToken)?;

        let user = Users::new(&mut tx)
            .get_user_by_email(&stored.email)
            .await?
            .ok_or(Error::InvalidPasswordToken)?;

        let user = Users::new(&mut tx)
            .update(
                user.id,
                &UserUpdateDBRequest {
                    password_hash: Some(stored.new_password_hash),
                    ..Default::default()
                },
            )
            .await?;
        PasswordTokens::new(&mut tx).delete(stored.id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!("Confirmed new password for user {}", abbrev_uuid(&user.id));
        self.respond(&user)
    }

    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn change_password(&self, user_id: UserId, request: ChangePasswordRequest) -> Result<MessageResponse> {
        self.passwords.check_new_password(&request.password, &request.password_repeat)?;

        let users = UserService::new(&self.state);
        let user = users.get_profile(user_id).await.map_err(|e| match e {
            Error::NotFound { .. } => Error::InvalidCredentials,
            other => other,
        })?;

        if !self.passwords.verify(&request.old_password, &user.password_hash).await? {
            return Err(Error::InvalidOldPassword);
        }

        let password_hash = self.passwords.hash(&request.password).await?;
        users.update_password(user_id, password_hash).await?;

        Ok(MessageResponse::new(PASSWORD_CHANGED_MESSAGE))
    }

    /// Rebuild the payload from the current row, e.g. after a profile change.
    pub async fn refresh_payload(&self, user_id: UserId) -> Result<UserPayload> {
        let user = UserService::new(&self.state).get_profile(user_id).await?;
        Ok(UserPayload::from(&user))
    }
}
