//! Redis cache for derived merchant majorities

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::config;
use crate::error::StoreError;
use crate::models::{MerchantMajority, NormalizedMerchant};

/// Freshness-window cache in front of the majority labeler.
///
/// `Some(None)` is a cached "no majority"; `None` is a miss.
#[async_trait]
pub trait MajorityCache: Send + Sync {
    async fn get(
        &self,
        merchant: &NormalizedMerchant,
    ) -> Result<Option<Option<MerchantMajority>>, StoreError>;

    async fn put(
        &self,
        merchant: &NormalizedMerchant,
        majority: Option<&MerchantMajority>,
    ) -> Result<(), StoreError>;
}

pub struct RedisCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisCache {
    pub async fn new() -> Result<Self, StoreError> {
        Self::connect(
            &config::get_redis_url(),
            config::get_majority_cache_ttl_seconds(),
        )
        .await
    }

    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid Redis URL: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;
        info!(ttl_seconds = ttl_seconds, "Redis majority cache connected");
        Ok(Self { conn, ttl_seconds })
    }

    fn key(merchant: &NormalizedMerchant) -> String {
        format!("ledgerlens:majority:{}", merchant)
    }
}

#[async_trait]
impl MajorityCache for RedisCache {
    async fn get(
        &self,
        merchant: &NormalizedMerchant,
    ) -> Result<Option<Option<MerchantMajority>>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(merchant))
            .await
            .map_err(|e| StoreError::Query(format!("Redis GET failed: {}", e)))?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("Bad cached majority: {}", e))),
        }
    }

    async fn put(
        &self,
        merchant: &NormalizedMerchant,
        majority: Option<&MerchantMajority>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(&majority)
            .map_err(|e| StoreError::Corrupt(format!("Failed to encode majority: {}", e)))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(merchant), json, self.ttl_seconds)
            .await
            .map_err(|e| StoreError::Query(format!("Redis SETEX failed: {}", e)))
    }
}
