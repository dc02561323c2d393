// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use crawlstudio::config::crawl_config::CrawlConfig;
use crawlstudio::domain::models::crawl_result::{CrawlResult, OutputFormat};
use crawlstudio::engines::dispatcher::CrawlDispatcher;
use crawlstudio::engines::local_render_engine::{LocalRenderEngine, PageRenderer, RenderedPage};
use crawlstudio::engines::registry::BackendRegistry;
use crawlstudio::engines::traits::{BackendDescriptor, CrawlBackend, EngineError};
use crawlstudio::infrastructure::cache::cache_manager::CacheManager;
use crawlstudio::infrastructure::cache::cache_strategy::{
    CacheKey, CacheStrategy, MemoryCacheStrategy,
};
use crawlstudio::utils::errors::{CacheError, CrawlError};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Renderer {}

    #[async_trait]
    impl PageRenderer for Renderer {
        async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, EngineError>;
    }
}

mock! {
    pub Backend {}

    #[async_trait]
    impl CrawlBackend for Backend {
        fn descriptor(&self) -> &BackendDescriptor;

        async fn crawl(
            &self,
            url: &str,
            format: OutputFormat,
            config: &CrawlConfig,
        ) -> Result<CrawlResult, CrawlError>;
    }
}

/// 一个简单的 HTML 页面
pub fn html_page(url: &str, html: &str) -> RenderedPage {
    RenderedPage {
        final_url: url.to_string(),
        status_code: 200,
        content_type: Some("text/html; charset=utf-8".to_string()),
        html: html.to_string(),
    }
}

/// 站内互相链接的页面，附带一个站外链接和一个回到首页的链接
pub fn site_page(url: &str) -> RenderedPage {
    html_page(
        url,
        r#"<html>
            <head><title>Site</title></head>
            <body>
                <h1>Section</h1>
                <a href="/a">A</a>
                <a href="/b">B</a>
                <a href="/c">C</a>
                <a href="https://other.org/x">Elsewhere</a>
                <a href="/">Home</a>
            </body>
        </html>"#,
    )
}

pub fn config(format: OutputFormat) -> CrawlConfig {
    CrawlConfig::builder()
        .format(format)
        .timeout_secs(5.0)
        .build()
        .unwrap()
}

/// 只注册了本地渲染后端（使用给定渲染器）的分发器
pub fn local_dispatcher(renderer: MockRenderer) -> CrawlDispatcher {
    local_dispatcher_with_cache(renderer, CacheManager::in_memory(100))
}

pub fn local_dispatcher_with_cache(renderer: MockRenderer, cache: CacheManager) -> CrawlDispatcher {
    let mut registry = BackendRegistry::new();
    registry.register_instance(Arc::new(LocalRenderEngine::with_renderer(Arc::new(renderer))));
    CrawlDispatcher::new(registry, cache)
}

/// 只接受读取、写入总是失败的缓存策略
pub struct WriteFailingStrategy {
    inner: MemoryCacheStrategy,
    failed_writes: AtomicUsize,
}

impl WriteFailingStrategy {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheStrategy::new(10),
            failed_writes: AtomicUsize::new(0),
        }
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStrategy for WriteFailingStrategy {
    async fn get(&self, key: &CacheKey) -> Result<Option<CrawlResult>, CacheError> {
        self.inner.get(key).await
    }

    async fn put(&self, _key: &CacheKey, _result: &CrawlResult, _ttl: Duration) -> Result<(), CacheError> {
        self.failed_writes.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("read-only replica".into()))
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }

    fn name(&self) -> &'static str {
        "write-failing"
    }
}
