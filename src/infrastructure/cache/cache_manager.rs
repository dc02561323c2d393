// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::settings::CacheSettings;
use crate::domain::models::crawl_result::CrawlResult;
use crate::infrastructure::cache::cache_strategy::{
    CacheKey, CacheStrategy, MemoryCacheStrategy, RedisCacheStrategy,
};
use crate::infrastructure::cache::redis_client::RedisClient;

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl CacheStats {
    /// 缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let total_requests = self.hits + self.misses;
        if total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / total_requests as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    errors: AtomicU64,
}

/// 缓存管理器
///
/// 在缓存策略之上提供尽力而为的语义：策略失败只记录告警，读取降级为未命中，
/// 写入降级为空操作，永远不会让爬取失败。
pub struct CacheManager {
    strategy: Arc<dyn CacheStrategy>,
    counters: Counters,
}

impl CacheManager {
    pub fn new(strategy: Arc<dyn CacheStrategy>) -> Self {
        Self {
            strategy,
            counters: Counters::default(),
        }
    }

    /// 创建基于内存的缓存管理器
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(Arc::new(MemoryCacheStrategy::new(max_entries)))
    }

    /// 根据配置创建缓存管理器
    ///
    /// 配置为 redis 但连接不可用时回退到内存缓存
    pub async fn from_settings(settings: &CacheSettings) -> Self {
        if settings.strategy.eq_ignore_ascii_case("redis") {
            match settings.redis_url.as_deref() {
                Some(url) => match Self::connect_redis(url).await {
                    Ok(client) => {
                        info!("Using redis cache strategy");
                        return Self::new(Arc::new(RedisCacheStrategy::new(
                            client,
                            settings.key_prefix.clone(),
                        )));
                    }
                    Err(e) => warn!("Redis cache unavailable, falling back to memory: {}", e),
                },
                None => warn!("Redis cache selected without redis_url, falling back to memory"),
            }
        }

        info!("Using memory cache strategy (max {} entries)", settings.max_entries);
        Self::in_memory(settings.max_entries)
    }

    async fn connect_redis(url: &str) -> anyhow::Result<RedisClient> {
        let client = RedisClient::new(url)?;
        client.ping().await?;
        Ok(client)
    }

    /// 获取缓存结果
    ///
    /// # 返回值
    ///
    /// 未命中、已过期或存储失败时返回 `None`
    pub async fn get(&self, key: &CacheKey) -> Option<CrawlResult> {
        match self.strategy.get(key).await {
            Ok(Some(result)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {}", key);
                Some(result)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// 写入缓存结果，失败时只记录告警
    pub async fn put(&self, key: &CacheKey, result: &CrawlResult, ttl: Duration) {
        match self.strategy.put(key, result, ttl).await {
            Ok(()) => {
                self.counters.stores.fetch_add(1, Ordering::Relaxed);
                debug!("Cached {} for {:?}", key, ttl);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Cache write failed for {}: {}", key, e);
            }
        }
    }

    /// 删除缓存值
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.strategy.delete(key).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    /// 清空缓存
    pub async fn clear(&self) {
        if let Err(e) = self.strategy.clear().await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!("Cache clear failed: {}", e);
        }
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            evictions: self.strategy.evictions(),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}
