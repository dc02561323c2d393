// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::crawl_config::CrawlConfig;
use crate::config::settings::Settings;
use crate::domain::models::crawl_result::CrawlResult;
use crate::engines::registry::BackendRegistry;
use crate::engines::traits::ensure_supported;
use crate::infrastructure::cache::cache_manager::CacheManager;
use crate::infrastructure::cache::cache_strategy::CacheKey;
use crate::infrastructure::metrics;
use crate::utils::errors::CrawlError;
use crate::utils::url_utils::parse_crawl_url;

/// 爬取分发器
///
/// 调用方的统一入口：按名称解析后端、检查缓存、在超时内调用后端并缓存成功结果
pub struct CrawlDispatcher {
    registry: BackendRegistry,
    cache: CacheManager,
}

impl CrawlDispatcher {
    pub fn new(registry: BackendRegistry, cache: CacheManager) -> Self {
        Self { registry, cache }
    }

    /// 根据进程级设置创建分发器，注册全部内置后端
    pub async fn from_settings(settings: Arc<Settings>) -> Self {
        metrics::describe_metrics();
        let cache = CacheManager::from_settings(&settings.cache).await;
        let registry = BackendRegistry::with_default_backends(settings);
        Self::new(registry, cache)
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// 分发一次爬取
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL，必须是绝对的 http(s) 地址
    /// * `config` - 已校验的爬取配置
    /// * `backend_name` - 后端名称
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlResult)` - 爬取结果，缓存命中时 `cache_hit` 为 true
    /// * `Err(CrawlError)` - 解析后端、格式检查、URL校验或后端执行失败（按此顺序检查）
    pub async fn dispatch(
        &self,
        url: &str,
        config: &CrawlConfig,
        backend_name: &str,
    ) -> Result<CrawlResult, CrawlError> {
        let outcome = self.dispatch_inner(url.trim(), config, backend_name).await;
        if let Err(e) = &outcome {
            metrics::record_failure(backend_name, e.kind());
            warn!(
                "Crawl of {} via {} failed ({}): {}",
                url,
                backend_name,
                e.kind(),
                e
            );
        }
        outcome
    }

    async fn dispatch_inner(
        &self,
        url: &str,
        config: &CrawlConfig,
        backend_name: &str,
    ) -> Result<CrawlResult, CrawlError> {
        let descriptor =
            self.registry
                .descriptor(backend_name)
                .ok_or_else(|| CrawlError::UnknownBackend {
                    backend: backend_name.to_string(),
                    url: url.to_string(),
                })?;

        let format = config.format();
        ensure_supported(descriptor, url, format)?;

        parse_crawl_url(url)?;

        metrics::record_request(backend_name);

        let key = CacheKey::new(url, format, backend_name);
        if config.cache_enabled() {
            if let Some(cached) = self.cache.get(&key).await {
                metrics::record_cache_hit(backend_name);
                info!("Serving {} via {} from cache", url, backend_name);
                return Ok(cached.with_cache_hit(true));
            }
        }

        let backend = self.registry.resolve(backend_name, url)?;

        info!("Crawling {} via {} as {}", url, backend_name, format);
        let start = Instant::now();
        let outcome = tokio::time::timeout(config.timeout(), backend.crawl(url, format, config)).await;
        let elapsed = start.elapsed();
        metrics::record_duration(backend_name, elapsed);

        let result = match outcome {
            Ok(result) => result?,
            Err(_) => {
                return Err(CrawlError::Timeout {
                    backend: backend_name.to_string(),
                    url: url.to_string(),
                    timeout_secs: config.timeout().as_secs_f64(),
                })
            }
        };

        debug!(
            "Crawled {} via {} in {}ms",
            url,
            backend_name,
            elapsed.as_millis()
        );

        if config.cache_enabled() {
            self.cache.put(&key, &result, config.cache_ttl()).await;
        }

        Ok(result)
    }
}
