// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::models::crawl_result::{CrawlResult, OutputFormat};
use crate::infrastructure::cache::redis_client::RedisClient;
use crate::utils::errors::CacheError;
use crate::utils::url_utils::normalize_url;

/// 缓存键
///
/// 由规范化后的URL、输出格式和后端名称组成，同一页面在不同格式或后端下分别缓存
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    url: String,
    format: OutputFormat,
    backend: String,
}

impl CacheKey {
    pub fn new(url: &str, format: OutputFormat, backend: &str) -> Self {
        Self {
            url: normalize_url(url),
            format,
            backend: backend.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// 存储层使用的字符串键
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.backend, self.format, self.url)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// 缓存策略接口
///
/// 实现方可以返回 [`CacheError`]，由缓存管理器统一吸收
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    /// 获取未过期的缓存结果
    async fn get(&self, key: &CacheKey) -> Result<Option<CrawlResult>, CacheError>;

    /// 写入缓存结果，同一键后写覆盖先写
    async fn put(&self, key: &CacheKey, result: &CrawlResult, ttl: Duration) -> Result<(), CacheError>;

    /// 删除缓存值
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// 清空缓存
    async fn clear(&self) -> Result<(), CacheError>;

    /// 策略名称
    fn name(&self) -> &'static str;

    /// 累计淘汰的条目数
    fn evictions(&self) -> u64 {
        0
    }
}

/// 缓存条目
#[derive(Clone)]
struct CacheEntry {
    result: CrawlResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(result: CrawlResult, ttl: Duration) -> Self {
        Self {
            result,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// 内存缓存策略
///
/// 基于 DashMap 分片存储，不同键之间互不阻塞。过期条目在读取时视为不存在并顺带删除；
/// 只有条目数超过上限时才整体扫描，先清理过期条目，再淘汰最早写入的条目直到低水位。
pub struct MemoryCacheStrategy {
    cache: DashMap<String, CacheEntry>,
    max_entries: usize,
    evictions: AtomicU64,
}

impl MemoryCacheStrategy {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: DashMap::new(),
            max_entries: max_entries.max(1),
            evictions: AtomicU64::new(0),
        }
    }

    /// 当前条目数（包括尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 超过上限后淘汰到的条目数，留出余量避免每次写入都整体扫描
    fn low_water_mark(&self) -> usize {
        self.max_entries - self.max_entries / 10
    }

    fn sweep_expired(&self) {
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired());
        let swept = before.saturating_sub(self.cache.len());
        if swept > 0 {
            self.evictions.fetch_add(swept as u64, Ordering::Relaxed);
            debug!("Swept {} expired entries from memory cache", swept);
        }
    }

    fn evict_if_needed(&self) {
        if self.cache.len() <= self.max_entries {
            return;
        }

        self.sweep_expired();
        let current_size = self.cache.len();
        if current_size <= self.max_entries {
            return;
        }

        let to_evict = current_size - self.low_water_mark();

        // 淘汰最早写入的条目
        let mut entries: Vec<(String, Instant)> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();
        entries.sort_by_key(|(_, created_at)| *created_at);

        for (key, _) in entries.iter().take(to_evict) {
            self.cache.remove(key);
        }

        self.evictions.fetch_add(to_evict as u64, Ordering::Relaxed);
        debug!("Evicted {} entries from memory cache", to_evict);
    }
}

impl Default for MemoryCacheStrategy {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStrategy for MemoryCacheStrategy {
    async fn get(&self, key: &CacheKey) -> Result<Option<CrawlResult>, CacheError> {
        let storage_key = key.storage_key();
        let entry = match self.cache.get(&storage_key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };

        if entry.is_expired() {
            debug!("Cache entry expired: {}", storage_key);
            if self
                .cache
                .remove_if(&storage_key, |_, entry| entry.is_expired())
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(None);
        }

        Ok(Some(entry.result))
    }

    async fn put(&self, key: &CacheKey, result: &CrawlResult, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.storage_key(), CacheEntry::new(result.clone(), ttl));
        self.evict_if_needed();
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.cache.remove(&key.storage_key());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Redis 中保存的缓存条目
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    result: CrawlResult,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() > (self.ttl_secs as i64).saturating_mul(1000)
    }
}

/// Redis缓存策略
///
/// 条目以JSON保存，Redis 的 `EX` 负责回收，读取时再按写入时间校验TTL
pub struct RedisCacheStrategy {
    client: RedisClient,
    key_prefix: String,
}

impl RedisCacheStrategy {
    pub fn new(client: RedisClient, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn redis_key(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.key_prefix, key.storage_key())
    }
}

fn unavailable(e: anyhow::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl CacheStrategy for RedisCacheStrategy {
    async fn get(&self, key: &CacheKey) -> Result<Option<CrawlResult>, CacheError> {
        let Some(raw) = self.client.get(&self.redis_key(key)).await.map_err(unavailable)? else {
            return Ok(None);
        };

        let entry: StoredEntry = serde_json::from_str(&raw)?;
        if entry.is_expired(Utc::now()) {
            debug!("Redis cache entry expired: {}", key);
            return Ok(None);
        }

        Ok(Some(entry.result))
    }

    async fn put(&self, key: &CacheKey, result: &CrawlResult, ttl: Duration) -> Result<(), CacheError> {
        let entry = StoredEntry {
            key: key.clone(),
            result: result.clone(),
            created_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        let payload = serde_json::to_string(&entry)?;

        // Redis 不接受 0 秒过期，读取时的TTL校验保证零TTL条目不会命中
        self.client
            .set_ex(&self.redis_key(key), &payload, ttl.as_secs().max(1))
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.client.del(&self.redis_key(key)).await.map_err(unavailable)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let keys = self
            .client
            .keys(&format!("{}:*", self.key_prefix))
            .await
            .map_err(unavailable)?;
        for key in keys {
            self.client.del(&key).await.map_err(unavailable)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
