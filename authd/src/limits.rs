//! Per-client request rate limiting.
//!
//! Each limited route gets a fixed window counter keyed by `{prefix}:{client ip}:{route}`.
//! Counters live in Redis when it is configured, so every instance shares them, and in an
//! in-process map otherwise. A request over the limit is answered with 429 `RATE_LIMIT`.
//!
//! Redis trouble never blocks traffic: if the counter script errors or takes longer than
//! `redis.timeout`, the request is let through and a warning is logged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::config::{LimitsConfig, RateLimitRule};
use crate::errors::{Error, Result};

/// Storage for fixed window counters.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one hit against `key`.
    ///
    /// Returns `None` while the caller is within `rule`, or the time until the window
    /// resets once it is exhausted.
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Option<Duration>;
}

/// In-process fixed window counters, used when no Redis is configured.
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    windows: DashMap<String, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for MemoryRateLimiter {
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Option<Duration> {
        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_insert(Window { started: now, count: 0 });

        let elapsed = now.duration_since(window.started);
        if elapsed >= rule.period {
            *window = Window { started: now, count: 0 };
        }

        if window.count >= rule.times {
            return Some(rule.period.saturating_sub(now.duration_since(window.started)));
        }

        window.count += 1;
        None
    }
}

/// Atomically increments the counter, starting a new window on the first hit.
/// Returns 0 when allowed, otherwise the remaining window in milliseconds.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local expire_time = ARGV[2]

local current = tonumber(redis.call('get', key) or "0")
if current > 0 then
    if current + 1 > limit then
        return redis.call("PTTL", key)
    else
        redis.call("INCR", key)
        return 0
    end
else
    redis.call("SET", key, 1, "px", expire_time)
    return 0
end
"#;

/// Redis-backed counters shared by every instance.
pub struct RedisRateLimiter {
    connection: ConnectionManager,
    script: redis::Script,
    timeout: Duration,
}

impl RedisRateLimiter {
    pub fn new(connection: ConnectionManager, timeout: Duration) -> Self {
        Self {
            connection,
            script: redis::Script::new(FIXED_WINDOW_SCRIPT),
            timeout,
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimiter {
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Option<Duration> {
        let mut connection = self.connection.clone();
        let mut invocation = self.script.key(key);
        invocation.arg(rule.times).arg(rule.period.as_millis() as u64);

        match tokio::time::timeout(self.timeout, invocation.invoke_async::<_, i64>(&mut connection)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(pexpire)) => Some(Duration::from_millis(pexpire.max(0) as u64)),
            Ok(Err(e)) => {
                warn!("Rate limiter Redis error, allowing request: {e}");
                None
            }
            Err(_) => {
                warn!("Rate limiter Redis call timed out after {:?}, allowing request", self.timeout);
                None
            }
        }
    }
}

/// Pick the counter store: Redis when a connection is available, otherwise in-process.
pub fn backend(redis: Option<ConnectionManager>, timeout: Duration) -> Arc<dyn RateLimitBackend> {
    match redis {
        Some(connection) => Arc::new(RedisRateLimiter::new(connection, timeout)),
        None => Arc::new(MemoryRateLimiter::new()),
    }
}

/// Middleware state for one limited route.
#[derive(Clone)]
pub struct RouteLimit {
    backend: Arc<dyn RateLimitBackend>,
    prefix: String,
    rule: RateLimitRule,
    enabled: bool,
}

impl RouteLimit {
    pub fn new(backend: Arc<dyn RateLimitBackend>, config: &LimitsConfig, rule: RateLimitRule) -> Self {
        Self {
            backend,
            prefix: config.prefix.clone(),
            rule,
            enabled: config.enabled,
        }
    }
}

/// Client address: first `X-Forwarded-For` entry, then the socket peer.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject the request with 429 once the client exhausts the route's window.
pub async fn enforce(State(limit): State<RouteLimit>, request: Request, next: Next) -> Result<Response> {
    if !limit.enabled {
        return Ok(next.run(request).await);
    }

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!("{}:{}:{}", limit.prefix, client_ip(&request), path);

    if let Some(retry_after) = limit.backend.hit(&key, limit.rule).await {
        debug!("Rate limit exceeded for {key}, window resets in {retry_after:?}");
        return Err(Error::TooManyRequests {
            message: "Too many requests".to_string(),
        });
    }

    Ok(next.run(request).await)
}
