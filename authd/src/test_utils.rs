//! Test utilities: in-memory database, temp-dir backed config, seeded users and a test server.

use std::path::Path;

use axum_test::TestServer;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tempfile::TempDir;

use crate::{
    AppState,
    api::models::users::UserPayload,
    auth::password::{self, Argon2Params},
    config::{Config, EmailTransportConfig, PasswordConfig},
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    services::users::allocate_nickname_number,
};

/// Captcha response accepted for any challenge in tests.
pub const TEST_CAPTCHA_BYPASS: &str = "TEST-BYPASS";

/// A single-connection in-memory SQLite pool with migrations applied.
///
/// The connection is never recycled, since closing it would drop the database.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    crate::migrator().run(&pool).await.expect("Failed to run migrations");
    pool
}

/// Config writing emails to `<dir>/emails` and media to `<dir>/media`, with cheap hashing.
pub fn create_test_config(dir: &Path) -> Config {
    let mut config = Config {
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };

    config.auth.password = PasswordConfig {
        argon2_memory_kib: 128,
        argon2_iterations: 1,
        argon2_parallelism: 1,
    };
    config.auth.captcha.super_response = Some(TEST_CAPTCHA_BYPASS.to_string());
    config.email.transport = EmailTransportConfig::File {
        path: dir.join("emails").to_string_lossy().to_string(),
    };
    config.media.root = dir.join("media");

    config
}

/// Application state over a fresh database. Keep the returned directory alive for the test.
pub async fn create_test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(dir.path());
    let pool = create_test_pool().await;

    let state = crate::build_state(config, pool, None).expect("Failed to build test state");
    (state, dir)
}

/// A test server over the full router, with its state for seeding and assertions.
pub async fn create_test_app() -> (TestServer, AppState, TempDir) {
    let (state, dir) = create_test_state().await;
    let router = crate::build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state, dir)
}

/// Insert an active user with `password`, nickname "Tester".
pub async fn create_test_user(pool: &SqlitePool, email: &str, password: &str) -> UserDBResponse {
    let password_hash = password::hash_string_with_params(
        password,
        Some(Argon2Params {
            memory_kib: 128,
            iterations: 1,
            parallelism: 1,
        }),
    )
    .expect("Failed to hash password");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let nickname_number = allocate_nickname_number(&mut conn, "Tester")
        .await
        .expect("Failed to allocate nickname number");

    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            password_hash,
            nickname: "Tester".to_string(),
            nickname_number,
            is_staff: false,
            is_superuser: false,
        })
        .await
        .expect("Failed to create test user")
}

/// `Authorization` header carrying a fresh access token for `user`.
pub fn bearer(state: &AppState, user: &UserDBResponse) -> (&'static str, String) {
    let tokens = state
        .jwt
        .create_tokens(&UserPayload::from(user))
        .expect("Failed to create tokens");
    ("Authorization", format!("Bearer {}", tokens.access))
}
