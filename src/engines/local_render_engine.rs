// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::crawl_config::CrawlConfig;
use crate::config::settings::HttpEngineSettings;
use crate::domain::models::crawl_result::{
    normalize, CrawlResult, OutputFormat, RawEngineOutput,
};
use crate::engines::traits::{
    ensure_supported, within_timeout, BackendDescriptor, BackendVariant, CrawlBackend,
    EngineError,
};
use crate::utils::content_extraction;
use crate::utils::errors::CrawlError;

/// 后端名称
pub const NAME: &str = "local-rendering";

static DESCRIPTOR: Lazy<BackendDescriptor> = Lazy::new(|| {
    BackendDescriptor::new(NAME, &OutputFormat::ALL, BackendVariant::LocalRendering)
});

/// 渲染后的页面
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// 重定向后的最终URL
    pub final_url: String,
    /// HTTP状态码
    pub status_code: u16,
    /// 内容类型
    pub content_type: Option<String>,
    /// 页面HTML
    pub html: String,
}

/// 页面渲染协作者
///
/// 负责实际获取页面，本地渲染后端只负责把结果归一化
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, EngineError>;
}

/// 基于 reqwest 的默认渲染器
pub struct HttpPageRenderer {
    client: reqwest::Client,
}

impl HttpPageRenderer {
    pub fn new(settings: &HttpEngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, EngineError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;

        let status_code = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let html = resp.text().await?;

        Ok(RenderedPage {
            final_url,
            status_code,
            content_type,
            html,
        })
    }
}

/// 本地渲染后端
///
/// 抓取页面后在本地完成 HTML、Markdown 转换和结构化回退提取
pub struct LocalRenderEngine {
    renderer: Arc<dyn PageRenderer>,
}

impl LocalRenderEngine {
    pub fn new(settings: &HttpEngineSettings) -> Result<Self, EngineError> {
        Ok(Self::with_renderer(Arc::new(HttpPageRenderer::new(settings)?)))
    }

    /// 使用自定义渲染器创建后端
    pub fn with_renderer(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    pub fn descriptor() -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    async fn fetch(
        &self,
        url: &str,
        format: OutputFormat,
        timeout: Duration,
    ) -> Result<RawEngineOutput, EngineError> {
        let page = within_timeout(timeout, self.renderer.render(url, timeout)).await?;
        debug!(
            "Rendered {} with status {} ({} bytes)",
            page.final_url,
            page.status_code,
            page.html.len()
        );

        if page.status_code >= 400 {
            return Err(EngineError::HttpStatus {
                status: page.status_code,
                message: format!("renderer returned status {}", page.status_code),
            });
        }

        let meta = content_extraction::extract_metadata(&page.html);
        let mut raw = RawEngineOutput::new(page.final_url)
            .with_meta("title", meta.title)
            .with_meta("description", meta.description)
            .with_meta("status_code", page.status_code)
            .with_meta("content_type", page.content_type);

        if format == OutputFormat::Markdown || format == OutputFormat::Structured {
            raw = raw.with_markdown(content_extraction::html_to_markdown(&page.html));
        }

        Ok(raw.with_html(page.html))
    }
}

#[async_trait]
impl CrawlBackend for LocalRenderEngine {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    async fn crawl(
        &self,
        url: &str,
        format: OutputFormat,
        config: &CrawlConfig,
    ) -> Result<CrawlResult, CrawlError> {
        ensure_supported(&DESCRIPTOR, url, format)?;

        let start = Instant::now();
        let raw = self
            .fetch(url, format, config.timeout())
            .await
            .map_err(|e| {
                warn!("Local rendering failed for {}: {}", url, e);
                e.into_crawl_error(NAME, url, config.timeout())
            })?;

        Ok(normalize(raw, format, NAME, start.elapsed().as_millis() as u64))
    }
}
