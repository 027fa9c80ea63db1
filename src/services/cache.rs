use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::Profile;
use crate::services::directory::{DirectoryError, ProfileDirectory};

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Multi-tier cache manager
///
/// Implements L1 (in-memory) and optional L2 (Redis) caching.
/// L1 is fastest but limited in size, L2 is shared across instances.
pub struct CacheManager {
    redis: Option<ConnectionManager>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    /// Create a new cache manager; `redis_url = None` keeps the cache process-local
    pub async fn new(redis_url: Option<&str>, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let redis = match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)?;
                Some(ConnectionManager::new(client).await?)
            }
            None => None,
        };

        Ok(Self::with_connection(redis, l1_size, ttl_secs))
    }

    /// L1-only cache
    pub fn local(l1_size: u64, ttl_secs: u64) -> Self {
        Self::with_connection(None, l1_size, ttl_secs)
    }

    fn with_connection(redis: Option<ConnectionManager>, l1_size: u64, ttl_secs: u64) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { redis, l1_cache, ttl_secs }
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

            if let Some(json) = value {
                tracing::trace!("L2 cache hit: {}", key);

                self.l1_cache.insert(key.to_string(), json.as_bytes().to_vec()).await;
                return Ok(serde_json::from_str(&json)?);
            }
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in every configured tier
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;

        self.l1_cache.insert(key.to_string(), json.as_bytes().to_vec()).await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let _: () = redis::cmd("SETEX")
                .arg(key)
                .arg(self.ttl_secs)
                .arg(json)
                .query_async(&mut conn)
                .await?;
        }

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Delete a value from every tier
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            shared_tier: self.redis.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub shared_tier: bool,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    pub fn profile(user_id: &str) -> String {
        format!("profile:{}", user_id)
    }
}

/// Profile directory with read-through caching of single-profile lookups
///
/// Candidate pools are never cached; only `get_profile` goes through the cache.
pub struct CachedDirectory {
    inner: Arc<dyn ProfileDirectory>,
    cache: Arc<CacheManager>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn ProfileDirectory>, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ProfileDirectory for CachedDirectory {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, DirectoryError> {
        let key = CacheKey::profile(user_id);

        match self.cache.get::<Profile>(&key).await {
            Ok(profile) => return Ok(profile),
            Err(CacheError::CacheMiss(_)) => {}
            Err(e) => tracing::warn!("Profile cache read failed for {}: {}", user_id, e),
        }

        let profile = self.inner.get_profile(user_id).await?;

        if let Err(e) = self.cache.set(&key, &profile).await {
            tracing::warn!("Profile cache write failed for {}: {}", user_id, e);
        }

        Ok(profile)
    }

    async fn list_profiles(
        &self,
        viewer_id: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Profile>, DirectoryError> {
        self.inner.list_profiles(viewer_id, excluded).await
    }
}
