//! # authd: account and authentication service
//!
//! `authd` is the account backend for a video site. It registers users behind a captcha,
//! authenticates them with JWT access and refresh tokens, resets forgotten passwords by email,
//! and serves the signed-in user's profile and avatar together with the public tag list.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses SQLite through `sqlx` for persistence. Redis is optional: when configured it backs the
//! rate limiter and the response cache so several instances share counters and cached pages;
//! otherwise both run in process.
//!
//! ### Request Flow
//!
//! A request passes the tracing and CORS layers, then (for the registration, login, captcha and
//! password-reset routes) the fixed-window rate limiter in [`limits`]. Protected handlers
//! take a [`api::models::users::UserPayload`] argument whose extractor validates the bearer
//! access token. Handlers are thin: they call into [`services`], which apply the business
//! rules and talk to the repositories in [`db`].
//!
//! ### Core Components
//!
//! - [`api`]: route handlers and request/response models
//! - [`auth`]: JWT encoding, the bearer extractor and password hashing
//! - [`services`]: registration, login, password flows, captcha, profiles and avatars
//! - [`db`]: repositories over SQLite, one per table
//! - [`limits`] and [`cache`]: Redis-or-local rate limiting and response caching
//! - [`email`]: password reset mail over SMTP or to files
//!
//! ### Background Work
//!
//! Last-login updates and password-reset emails run as detached `tokio` tasks so responses
//! do not wait on them. Failures are logged and not retried.
//!
//! ## Getting Started
//!
//! ```bash
//! AUTHD_SECRET_KEY=change-me cargo run -- -f config.yaml
//! ```
//!
//! The OpenAPI document is served at `/openapi.json` and rendered at `/docs`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod limits;
mod openapi;
pub mod services;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use bon::Builder;
use redis::aio::ConnectionManager;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    auth::{
        jwt::JwtService,
        password::{self, Argon2Params},
    },
    cache::ResponseCache,
    config::{CorsOrigin, RateLimitRule},
    db::{
        errors::DbError,
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    email::EmailService,
    limits::{RateLimitBackend, RouteLimit},
    openapi::ApiDoc,
    services::users::{allocate_nickname_number, normalize_email},
    types::UserId,
};

/// Nickname given to a superuser created at startup.
pub const SUPERUSER_NICKNAME: &str = "Superuser";

/// Extra room on top of the avatar size limit for the multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// - `db`: SQLite connection pool
/// - `config`: application configuration
/// - `jwt`: token signing and validation
/// - `limiter`: rate limit counters, in Redis or in process
/// - `cache`: response cache, in Redis or in process
/// - `mailer`: outgoing email
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .jwt(jwt)
///     .limiter(limiter)
///     .cache(cache)
///     .mailer(mailer)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub jwt: Arc<JwtService>,
    pub limiter: Arc<dyn RateLimitBackend>,
    pub cache: ResponseCache,
    pub mailer: Arc<EmailService>,
}

/// Get the authd database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the SQLite pool, creating the database file if needed, and run migrations.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)
        .with_context(|| format!("Invalid database URL {}", config.database.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    migrator().run(&pool).await.context("Failed to run migrations")?;
    Ok(pool)
}

/// Create the superuser if it doesn't exist.
///
/// This function is idempotent - an existing account with `email` is promoted to an active
/// staff superuser and gets `password` set, otherwise a new one is created. It runs on every
/// startup so the configured credentials always work.
///
/// Returns the user ID of the created or existing superuser.
#[instrument(skip_all)]
pub async fn create_initial_superuser(email: &str, password: &str, params: Argon2Params, db: &SqlitePool) -> errors::Result<UserId> {
    let email = normalize_email(email)?;
    let password_hash = password::hash_string_with_params(password, Some(params))?;

    let mut tx = db.begin().await.map_err(DbError::from)?;

    if let Some(existing) = Users::new(&mut tx).get_user_by_email(&email).await? {
        let promoted = Users::new(&mut tx)
            .update(
                existing.id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    is_staff: Some(true),
                    is_active: Some(true),
                    is_superuser: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        tx.commit().await.map_err(DbError::from)?;
        info!("Superuser {} already exists, credentials refreshed", email);
        return Ok(promoted.id);
    }

    let nickname_number = allocate_nickname_number(&mut tx, SUPERUSER_NICKNAME).await?;
    let created = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            email,
            password_hash,
            nickname: SUPERUSER_NICKNAME.to_string(),
            nickname_number,
            is_staff: true,
            is_superuser: true,
        })
        .await?;
    tx.commit().await.map_err(DbError::from)?;

    info!("Created superuser {}", created.email);
    Ok(created.id)
}

/// Connect to Redis when a URL is configured.
async fn setup_redis(config: &Config) -> anyhow::Result<Option<ConnectionManager>> {
    let Some(url) = config.redis.url.as_deref() else {
        info!("No Redis URL configured, using in-process rate limiting and caching");
        return Ok(None);
    };

    let client = redis::Client::open(url).context("Invalid Redis URL")?;
    let connection = client
        .get_connection_manager()
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");
    Ok(Some(connection))
}

/// Assemble the shared state from its parts.
pub fn build_state(config: Config, pool: SqlitePool, redis: Option<ConnectionManager>) -> anyhow::Result<AppState> {
    let jwt = JwtService::new(&config)?;
    let mailer = EmailService::new(&config)?;
    let limiter = limits::backend(redis.clone(), config.redis.timeout);
    let cache = ResponseCache::new(redis, &config.cache.prefix, config.cache.tags_ttl);

    Ok(AppState::builder()
        .db(pool)
        .config(config)
        .jwt(Arc::new(jwt))
        .limiter(limiter)
        .cache(cache)
        .mailer(Arc::new(mailer))
        .build())
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.auth.cors.allowed_origins;
    let allow_origin = if allowed.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(config.auth.cors.allow_credentials)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::OPTIONS])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - Auth routes, with rate limits on registration, login, captcha and password reset
/// - Profile and avatar routes behind bearer authentication
/// - Tag listing, health check, OpenAPI document and viewer
/// - Static serving of stored media
/// - CORS and tracing layers
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let limit_config = &state.config.limits;
    let limited = |rule: RateLimitRule| from_fn_with_state(RouteLimit::new(state.limiter.clone(), limit_config, rule), limits::enforce);

    let avatar_body_limit = usize::try_from(state.config.media.avatar.max_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let auth_routes = Router::new()
        .route(
            "/auth/register/",
            post(api::handlers::auth::register).route_layer(limited(limit_config.register)),
        )
        .route("/auth/login/", post(api::handlers::auth::login).route_layer(limited(limit_config.login)))
        .route("/auth/refresh/", post(api::handlers::auth::refresh))
        .route(
            "/auth/request-new-password/{email}/",
            post(api::handlers::auth::request_new_password).route_layer(limited(limit_config.request_new_password)),
        )
        .route("/auth/confirm-new-password/{token}/", post(api::handlers::auth::confirm_new_password))
        .route("/auth/captcha/", get(api::handlers::auth::captcha).route_layer(limited(limit_config.captcha)))
        .route("/auth/change-password/", post(api::handlers::auth::change_password));

    let profile_routes = Router::new()
        .route(
            "/profile/",
            get(api::handlers::profile::get_profile).patch(api::handlers::profile::patch_profile),
        )
        .route(
            "/profile/avatar/",
            put(api::handlers::profile::change_avatar).layer(DefaultBodyLimit::max(avatar_body_limit)),
        );

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/tags/", get(api::handlers::tags::list_tags))
        .merge(auth_routes)
        .merge(profile_routes)
        .with_state(state.clone())
        .nest_service(&state.config.media.url_path, ServeDir::new(&state.config.media.root))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service.
///
/// 1. **Create**: [`Application::new`] connects to the database (running migrations) and
///    Redis, then builds the state and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting authd with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let redis = setup_redis(&config).await?;

        if let (Some(email), Some(password)) = (&config.superuser_email, &config.superuser_password) {
            create_initial_superuser(email, password, Argon2Params::from(&config.auth.password), &pool)
                .await
                .context("Failed to create superuser")?;
        }

        tokio::fs::create_dir_all(&config.media.root)
            .await
            .with_context(|| format!("Failed to create media root {}", config.media.root.display()))?;

        let state = build_state(config.clone(), pool.clone(), redis)?;
        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service_with_connect_info::<SocketAddr>()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("authd listening on http://{}", bind_addr);

        // Peer addresses feed the rate limiter when no X-Forwarded-For is present
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
