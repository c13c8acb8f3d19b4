//! Response cache for read-mostly endpoints.
//!
//! Values are stored as serialized JSON under `{prefix}:{namespace}:{key}`. With Redis
//! configured entries are shared between instances and expire via `SET ... EX`; without it a
//! local `moka` cache holds them. Cache failures are logged and treated as misses.

use std::time::Duration;

use moka::future::Cache;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{trace, warn};

#[derive(Clone)]
pub enum ResponseCache {
    Redis { connection: ConnectionManager, prefix: String },
    Local { entries: Cache<String, String>, prefix: String },
}

impl ResponseCache {
    pub fn new(redis: Option<ConnectionManager>, prefix: &str, ttl: Duration) -> Self {
        match redis {
            Some(connection) => Self::Redis {
                connection,
                prefix: prefix.to_string(),
            },
            None => Self::Local {
                entries: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
                prefix: prefix.to_string(),
            },
        }
    }

    fn full_key(&self, namespace: &str, key: &str) -> String {
        let prefix = match self {
            Self::Redis { prefix, .. } | Self::Local { prefix, .. } => prefix,
        };
        format!("{prefix}:{namespace}:{key}")
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let full_key = self.full_key(namespace, key);

        let raw = match self {
            Self::Redis { connection, .. } => {
                let mut connection = connection.clone();
                match connection.get::<_, Option<String>>(&full_key).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("Cache read failed for {full_key}: {e}");
                        None
                    }
                }
            }
            Self::Local { entries, .. } => entries.get(&full_key).await,
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => {
                trace!("Cache hit for {full_key}");
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {full_key}: {e}");
                None
            }
        }
    }

    /// Store a value. `ttl` applies to Redis entries; local entries use the cache-wide TTL.
    pub async fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T, ttl: Duration) {
        let full_key = self.full_key(namespace, key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache entry {full_key}: {e}");
                return;
            }
        };

        match self {
            Self::Redis { connection, .. } => {
                let mut connection = connection.clone();
                if let Err(e) = connection.set_ex::<_, _, ()>(&full_key, raw, ttl.as_secs().max(1)).await {
                    warn!("Cache write failed for {full_key}: {e}");
                }
            }
            Self::Local { entries, .. } => entries.insert(full_key, raw).await,
        }
    }
}
