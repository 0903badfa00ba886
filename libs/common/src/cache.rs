//! Cache module for the DealDrop services
//!
//! Session records, failed-login counters, lockouts and revoked refresh
//! tokens all live behind the [`Cache`] trait. Production uses [`RedisPool`];
//! [`MemoryCache`] backs single-node development setups and the test suites.

use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Key/value operations the services rely on
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a string value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value with an optional TTL
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    /// Delete a key of any kind
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically increment a counter and return the new value.
    ///
    /// The TTL is only applied when the increment creates the key, so the
    /// counter expires a fixed time after its first hit.
    async fn incr(&self, key: &str, ttl_seconds: u64) -> Result<i64>;

    /// Remaining lifetime of a key, `None` when missing or persistent
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// Add a member to a set
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    /// Remove a member from a set
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    /// All members of a set (empty when missing)
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// All keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_MAX_CONNECTIONS`: Maximum number of connections (default: 10)
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let max_connections = std::env::var("REDIS_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Ok(RedisConfig {
            url,
            max_connections,
        })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl Cache for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_seconds: u64) -> Result<i64> {
        let mut conn = self.get_connection().await?;
        let value: i64 = conn.incr(key, 1).await?;
        if value == 1 {
            let _: bool = conn.expire(key, ttl_seconds as i64).await?;
        }
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.get_connection().await?;
        let ttl: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(ttl).ok())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        // SCAN instead of KEYS so large keyspaces don't block the server
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[derive(Debug)]
enum MemoryValue {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process cache with the same semantics as the Redis backend
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(ttl_seconds: Option<u64>) -> Option<Instant> {
        ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }

        match entries.get(key) {
            Some(MemoryEntry {
                value: MemoryValue::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => anyhow::bail!("key {} does not hold a string value", key),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(value.to_string()),
                expires_at: Self::expiry(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_seconds: u64) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert(MemoryEntry {
            value: MemoryValue::Text("0".to_string()),
            expires_at: Self::expiry(Some(ttl_seconds)),
        });

        let MemoryValue::Text(current) = &mut entry.value else {
            anyhow::bail!("key {} does not hold a counter", key);
        };
        let next = current.parse::<i64>()? + 1;
        *current = next.to_string();
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(MemoryEntry {
            value: MemoryValue::Set(HashSet::new()),
            expires_at: None,
        });

        let MemoryValue::Set(members) = &mut entry.value else {
            anyhow::bail!("key {} does not hold a set", key);
        };
        members.insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now_empty = match entries.get_mut(key) {
            Some(MemoryEntry {
                value: MemoryValue::Set(members),
                ..
            }) => {
                members.remove(member);
                members.is_empty()
            }
            _ => false,
        };
        // Redis drops empty sets
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(MemoryEntry {
                value: MemoryValue::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
