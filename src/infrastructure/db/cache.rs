//! SQLite-backed memoization cache for CRM reads.
//!
//! Entries are JSON payloads keyed by a SHA-256 of category and request
//! parameters. Each category has a fixed TTL; expired rows are ignored on
//! read and removed by `purge_expired`.

use crate::domain::error::{AppError, Result};
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Deals,
    Activities,
    StageHistory,
    Users,
    Stages,
    Categories,
    Departments,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Deals => "deals",
            CacheCategory::Activities => "activities",
            CacheCategory::StageHistory => "stage_history",
            CacheCategory::Users => "users",
            CacheCategory::Stages => "stages",
            CacheCategory::Categories => "categories",
            CacheCategory::Departments => "departments",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CacheCategory::Deals | CacheCategory::Activities | CacheCategory::StageHistory => {
                Duration::minutes(30)
            }
            CacheCategory::Users
            | CacheCategory::Stages
            | CacheCategory::Categories
            | CacheCategory::Departments => Duration::minutes(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub valid_entries: i64,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f32,
}

pub struct SqliteCache {
    pool: SqlitePool,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SqliteCache {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse connection string: {}", e))
            })?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database; a single long-lived connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse connection string: {}", e)))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            pool,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        })
    }

    pub fn cache_key(category: CacheCategory, params: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(category.as_str().as_bytes());
        hasher.update(b"::");
        hasher.update(params.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get<T: DeserializeOwned>(&self, category: CacheCategory, params: &str) -> Result<Option<T>> {
        let key = Self::cache_key(category, params);
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM cache_entries WHERE key = ? AND expires_at > ?")
                .bind(&key)
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to read cache: {}", e)))?;

        match row {
            Some((payload,)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let value = serde_json::from_str(&payload)
                    .map_err(|e| AppError::ParseError(format!("Corrupt cache entry: {}", e)))?;
                Ok(Some(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub async fn put<T: Serialize>(&self, category: CacheCategory, params: &str, value: &T) -> Result<()> {
        self.put_with_ttl(category, params, value, category.ttl()).await
    }

    pub async fn put_with_ttl<T: Serialize>(
        &self,
        category: CacheCategory,
        params: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| AppError::ParseError(format!("Failed to serialize cache entry: {}", e)))?;
        let expires_at = (Utc::now() + ttl).timestamp();

        sqlx::query(
            "INSERT INTO cache_entries (key, category, payload, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at",
        )
        .bind(Self::cache_key(category, params))
        .bind(category.as_str())
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to write cache: {}", e)))?;

        Ok(())
    }

    /// Cached value for the key, or the result of `fetch` stored under it.
    pub async fn get_or_fetch<T, F, Fut>(&self, category: CacheCategory, params: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(category, params).await? {
            debug!(category = category.as_str(), "Cache hit");
            return Ok(cached);
        }
        let value = fetch().await?;
        self.put(category, params, &value).await?;
        Ok(value)
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to purge cache: {}", e)))?;
        info!(removed = result.rows_affected(), "Purged expired cache entries");
        Ok(result.rows_affected())
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to clear cache: {}", e)))?;
        info!(removed = result.rows_affected(), "Cleared cache");
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let (total_entries, valid_entries): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at > ? THEN 1 ELSE 0 END), 0) FROM cache_entries",
        )
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read cache stats: {}", e)))?;

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            hits as f32 / total_requests as f32
        } else {
            0.0
        };

        Ok(CacheStats {
            total_entries,
            valid_entries,
            hits,
            misses,
            hit_rate,
        })
    }
}
