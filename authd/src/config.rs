//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `AUTHD_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AUTHD_` override YAML values
//! 3. **DATABASE_URL** / **REDIS_URL** - Special case: override `database.url` / `redis.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `AUTHD_AUTH__JWT__ALGORITHM=HS512` sets the `auth.jwt.algorithm` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use authd::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`
//! - **Security**: `secret_key` (signs JWTs), `auth.cors`
//! - **Superuser**: `superuser_email`, `superuser_password` - staff superuser ensured on every startup
//! - **Database**: `database.url`, `database.max_connections` - SQLite connection settings
//! - **Redis**: `redis.url`, `redis.timeout` - shared rate limiting and caching (optional)
//! - **Authentication**: `auth.jwt`, `auth.password`, `auth.captcha`, `auth.password_reset`
//! - **Rate limits**: `limits.*` - per-route fixed-window limits
//! - **Cache**: `cache.prefix`, `cache.tags_ttl`
//! - **Media**: `media.root`, `media.url_path`, `media.avatar`
//! - **Email**: `email.type` (`smtp` or `file`), sender details
//! - **Telemetry**: `telemetry.telegram` - forward ERROR logs to a Telegram chat
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! AUTHD_PORT=8080
//! AUTHD_SECRET_KEY=change-me
//! DATABASE_URL="sqlite:///var/lib/authd/authd.db?mode=rwc"
//! REDIS_URL="redis://localhost:6379/0"
//! AUTHD_LIMITS__LOGIN__TIMES=20
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// JWT algorithms we can sign with. Only symmetric HMAC variants are supported.
pub const SUPPORTED_JWT_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AUTHD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for JWT signing (required)
    pub secret_key: Option<String>,
    /// Email of the superuser created (or promoted) on startup
    pub superuser_email: Option<String>,
    /// Password set on the superuser at every startup
    #[serde(skip_serializing)]
    pub superuser_password: Option<String>,
    /// Set from the `DATABASE_URL` environment variable, folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Set from the `REDIS_URL` environment variable, folded into `redis.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    /// Per-route rate limits
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    /// Uploaded media (avatars)
    pub media: MediaConfig,
    /// Email configuration for password resets
    pub email: EmailConfig,
    pub telemetry: TelemetryConfig,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLx connection string, e.g. `sqlite://authd.db?mode=rwc`
    pub url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
}

/// Redis settings. Without a URL the service falls back to in-process rate limiting and caching,
/// which is only correct for a single instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub url: Option<String>,
    /// Upper bound on a single Redis round trip before we give up and fail open
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub captcha: CaptchaConfig,
    pub password_reset: PasswordResetConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// JWT issuance settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct JwtConfig {
    /// One of HS256, HS384, HS512
    pub algorithm: String,
    /// Lifetime of access tokens
    #[serde(with = "humantime_serde")]
    pub access_expiration: Duration,
    /// Lifetime of refresh tokens
    #[serde(with = "humantime_serde")]
    pub refresh_expiration: Duration,
    /// Clock skew tolerated when checking `exp`
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

/// Argon2 parameters used when hashing new passwords.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB, secure for production)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2, secure for production)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

/// Registration captcha settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptchaConfig {
    /// A response accepted for any challenge. Leave unset in production.
    pub super_response: Option<String>,
    /// How long a challenge stays valid
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of characters to render
    pub length: usize,
}

/// Password reset flow settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordResetConfig {
    /// How long an emailed token can be confirmed
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
    /// Length of the generated replacement password
    pub password_length: usize,
    /// Length of the emailed token
    pub token_length: usize,
    /// Public base URL used to build the confirmation link in emails
    pub base_url: Url,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Per-route rate limits. A request over the limit gets `429 RATE_LIMIT`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Turn limiting off entirely (useful in development)
    pub enabled: bool,
    /// Redis key prefix for limiter counters
    pub prefix: String,
    pub register: RateLimitRule,
    pub login: RateLimitRule,
    pub request_new_password: RateLimitRule,
    pub captcha: RateLimitRule,
}

/// Allow `times` requests per `period` for each client and route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    pub times: u32,
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl RateLimitRule {
    pub const fn new(times: u32, period: Duration) -> Self {
        Self { times, period }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Key prefix for cached entries
    pub prefix: String,
    /// How long the tag list is served from cache
    #[serde(with = "humantime_serde")]
    pub tags_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Directory uploaded files are written to
    pub root: PathBuf,
    /// URL path the media directory is served under
    pub url_path: String,
    pub avatar: AvatarConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvatarConfig {
    /// Largest accepted upload in bytes
    pub max_size: u64,
    /// Stored avatar width in pixels
    pub width: u32,
    /// Stored avatar height in pixels
    pub height: u32,
    /// Largest decoded frame, in bytes of RGBA, an upload may expand to
    pub max_decoded_size: u64,
    /// Most frames kept from an animated upload
    pub max_frames: usize,
}

/// Logging extras beyond the console output.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub telegram: TelegramConfig,
}

/// Forwarding of ERROR events to a Telegram chat through the Bot API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// Bot API base URL
    pub api_url: Url,
    /// Per-message request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Email configuration for password resets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    /// Email transport method
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
    /// Who to set the reply to field from
    pub reply_to: Option<String>,
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    /// Send emails via SMTP server
    Smtp {
        /// SMTP server hostname
        host: String,
        /// SMTP server port
        port: u16,
        /// SMTP authentication username
        username: String,
        /// SMTP authentication password
        password: String,
        /// Use TLS encryption
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File {
        /// Directory path where email files will be written
        path: String,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            secret_key: None,
            superuser_email: None,
            superuser_password: None,
            database_url: None,
            redis_url: None,
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            cache: CacheConfig::default(),
            media: MediaConfig::default(),
            email: EmailConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://authd.db?mode=rwc".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_millis(250),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            access_expiration: Duration::from_secs(60 * 60),           // 1 hour
            refresh_expiration: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
            leeway: Duration::ZERO,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            // Secure defaults for production (Argon2id RFC recommendations)
            argon2_memory_kib: 19456, // 19 MB
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            super_response: None,
            lifetime: Duration::from_secs(60 * 60),
            width: 410,
            height: 140,
            length: 5,
        }
    }
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            password_length: 14,
            token_length: 255,
            base_url: Url::parse("http://localhost:8000").expect("static URL is valid"),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Url(Url::parse("http://localhost:3000").expect("static URL is valid")), // Development frontend
            ],
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "authd-limiter".to_string(),
            register: RateLimitRule::new(5, Duration::from_secs(60)),
            login: RateLimitRule::new(10, Duration::from_secs(60)),
            request_new_password: RateLimitRule::new(3, Duration::from_secs(60)),
            captcha: RateLimitRule::new(20, Duration::from_secs(60)),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "authd-cache".to_string(),
            tags_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./media"),
            url_path: "/media".to_string(),
            avatar: AvatarConfig::default(),
        }
    }
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10 MB
            width: 140,
            height: 140,
            max_decoded_size: 256 * 1024 * 1024, // 256 MB
            max_frames: 500,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_url: Url::parse("https://api.telegram.org").expect("static URL is valid"),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "noreply@example.com".to_string(),
            from_name: "authd".to_string(),
            reply_to: None,
        }
    }
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }
        if let Some(url) = config.redis_url.take() {
            config.redis.url = Some(url);
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set AUTHD_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        if self.superuser_email.is_some() && self.superuser_password.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: superuser_password is required when superuser_email is set".to_string(),
            });
        }

        let telegram = &self.telemetry.telegram;
        if telegram.enabled && (telegram.bot_token.as_deref().is_none_or(str::is_empty) || telegram.chat_id.is_none()) {
            return Err(Error::Internal {
                operation: "Config validation: telemetry.telegram needs bot_token and chat_id when enabled".to_string(),
            });
        }

        let jwt = &self.auth.jwt;
        if !SUPPORTED_JWT_ALGORITHMS.contains(&jwt.algorithm.as_str()) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Unsupported JWT algorithm '{}'. Use one of {}",
                    jwt.algorithm,
                    SUPPORTED_JWT_ALGORITHMS.join(", ")
                ),
            });
        }

        if jwt.access_expiration.is_zero() || jwt.access_expiration >= jwt.refresh_expiration {
            return Err(Error::Internal {
                operation: "Config validation: auth.jwt.access_expiration must be positive and shorter than refresh_expiration"
                    .to_string(),
            });
        }

        // Validate CORS configuration
        if self.auth.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self
            .auth
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        let rules = [
            ("register", self.limits.register),
            ("login", self.limits.login),
            ("request_new_password", self.limits.request_new_password),
            ("captcha", self.limits.captcha),
        ];
        for (name, rule) in rules {
            if rule.times == 0 || rule.period.is_zero() {
                return Err(Error::Internal {
                    operation: format!("Config validation: limits.{name} needs positive times and period"),
                });
            }
        }

        let avatar = &self.media.avatar;
        if avatar.max_size == 0 || avatar.width == 0 || avatar.height == 0 || avatar.max_decoded_size == 0 || avatar.max_frames == 0 {
            return Err(Error::Internal {
                operation: "Config validation: media.avatar max_size, width, height, max_decoded_size and max_frames must be positive"
                    .to_string(),
            });
        }

        let url_path = &self.media.url_path;
        if !url_path.starts_with('/') || url_path.trim_end_matches('/').is_empty() {
            return Err(Error::Internal {
                operation: format!("Config validation: media.url_path must be a non-root absolute path, got '{url_path}'"),
            });
        }

        let captcha = &self.auth.captcha;
        if captcha.length == 0 || captcha.width == 0 || captcha.height == 0 {
            return Err(Error::Internal {
                operation: "Config validation: auth.captcha length, width and height must be positive".to_string(),
            });
        }

        let reset = &self.auth.password_reset;
        if reset.password_length < 8 || reset.token_length == 0 {
            return Err(Error::Internal {
                operation: "Config validation: auth.password_reset.password_length must be at least 8 and token_length positive"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("AUTHD_").ignore(&["CONFIG"]).split("__"))
            // Common DATABASE_URL and REDIS_URL patterns
            .merge(Env::raw().only(&["DATABASE_URL", "REDIS_URL"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    fn valid_config() -> Config {
        Config {
            secret_key: Some("test-secret-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_yaml_sections() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
auth:
  jwt:
    algorithm: HS512
    access_expiration: 5m
    refresh_expiration: 7d
    leeway: 10s
  captcha:
    super_response: letmein
limits:
  login:
    times: 3
    period: 1m
email:
  type: file
  path: /tmp/authd-mail
  from_email: auth@example.com
"#,
            )?;

            let config = Config::load(&args())?;

            assert_eq!(config.auth.jwt.algorithm, "HS512");
            assert_eq!(config.auth.jwt.access_expiration, Duration::from_secs(300));
            assert_eq!(config.auth.jwt.refresh_expiration, Duration::from_secs(7 * 24 * 3600));
            assert_eq!(config.auth.jwt.leeway, Duration::from_secs(10));
            assert_eq!(config.auth.captcha.super_response.as_deref(), Some("letmein"));
            // Untouched captcha values keep their defaults
            assert_eq!(config.auth.captcha.width, 410);
            assert_eq!(config.auth.captcha.lifetime, Duration::from_secs(3600));

            assert_eq!(config.limits.login, RateLimitRule::new(3, Duration::from_secs(60)));
            assert_eq!(config.limits.register, LimitsConfig::default().register);

            assert!(matches!(config.email.transport, EmailTransportConfig::File { ref path } if path == "/tmp/authd-mail"));
            assert_eq!(config.email.from_email, "auth@example.com");

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nport: 9000\n")?;

            jail.set_env("AUTHD_HOST", "127.0.0.1");
            jail.set_env("AUTHD_PORT", "8080");
            jail.set_env("AUTHD_LIMITS__ENABLED", "false");
            jail.set_env("AUTHD_MEDIA__AVATAR__WIDTH", "64");

            let config = Config::load(&args())?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert!(!config.limits.enabled);
            assert_eq!(config.media.avatar.width, 64);
            assert_eq!(config.media.avatar.height, 140);

            Ok(())
        });
    }

    #[test]
    fn test_database_and_redis_url_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
database:
  url: sqlite://from-yaml.db
  max_connections: 3
"#,
            )?;

            jail.set_env("DATABASE_URL", "sqlite://from-env.db");
            jail.set_env("REDIS_URL", "redis://localhost:6379/1");

            let config = Config::load(&args())?;

            assert_eq!(config.database.url, "sqlite://from-env.db");
            assert_eq!(config.database.max_connections, 3);
            assert_eq!(config.redis.url.as_deref(), Some("redis://localhost:6379/1"));
            assert!(config.database_url.is_none());
            assert!(config.redis_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nauth:\n  jwt:\n    algorithim: HS256\n")?;

            assert!(Config::load(&args()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_config_validation_missing_secret() {
        let config = Config::default();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("secret_key is not configured"));
    }

    #[test]
    fn test_config_validation_unsupported_algorithm() {
        let mut config = valid_config();
        config.auth.jwt.algorithm = "RS256".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Unsupported JWT algorithm"));
    }

    #[test]
    fn test_config_validation_access_longer_than_refresh() {
        let mut config = valid_config();
        config.auth.jwt.access_expiration = Duration::from_secs(3600);
        config.auth.jwt.refresh_expiration = Duration::from_secs(60);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_wildcard_with_credentials() {
        let mut config = valid_config();
        config.auth.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        config.auth.cors.allow_credentials = true;
        assert!(config.validate().unwrap_err().to_string().contains("wildcard"));

        config.auth.cors.allow_credentials = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_rate_limit() {
        let mut config = valid_config();
        config.limits.captcha.times = 0;

        assert!(config.validate().unwrap_err().to_string().contains("limits.captcha"));
    }

    #[test]
    fn test_config_validation_superuser_needs_password() {
        let mut config = valid_config();
        config.superuser_email = Some("root@example.com".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("superuser_password"));

        config.superuser_password = Some("Root12345".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_telegram_needs_credentials() {
        let mut config = valid_config();
        config.telemetry.telegram.enabled = true;
        config.telemetry.telegram.chat_id = Some("-100123".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("telemetry.telegram"));

        config.telemetry.telegram.bot_token = Some("123:abc".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_superuser_and_telegram_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\ntelemetry:\n  telegram:\n    enabled: true\n    chat_id: '42'\n")?;

            jail.set_env("AUTHD_SUPERUSER_EMAIL", "root@example.com");
            jail.set_env("AUTHD_SUPERUSER_PASSWORD", "Root12345");
            jail.set_env("AUTHD_TELEMETRY__TELEGRAM__BOT_TOKEN", "123:abc");

            let config = Config::load(&args())?;

            assert_eq!(config.superuser_email.as_deref(), Some("root@example.com"));
            assert_eq!(config.superuser_password.as_deref(), Some("Root12345"));
            assert!(config.telemetry.telegram.enabled);
            assert_eq!(config.telemetry.telegram.chat_id.as_deref(), Some("42"));
            assert_eq!(config.telemetry.telegram.bot_token.as_deref(), Some("123:abc"));
            assert_eq!(config.telemetry.telegram.api_url.as_str(), "https://api.telegram.org/");

            Ok(())
        });
    }

    #[test]
    fn test_config_validation_valid_config() {
        assert!(valid_config().validate().is_ok());
    }
}
