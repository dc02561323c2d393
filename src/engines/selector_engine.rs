// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::crawl_config::CrawlConfig;
use crate::config::settings::HttpEngineSettings;
use crate::domain::models::crawl_result::{
    normalize, CrawlResult, OutputFormat, RawEngineOutput,
};
use crate::domain::services::extraction_service::{ExtractionRule, ExtractionService};
use crate::engines::traits::{
    ensure_supported, within_timeout, BackendDescriptor, BackendVariant, CrawlBackend,
    EngineError,
};
use crate::utils::content_extraction;
use crate::utils::errors::CrawlError;

/// 后端名称
pub const NAME: &str = "selector";

/// 自定义选择器所在的后端选项键
pub const SELECTORS_OPTION: &str = "selectors";

const SUMMARY_CHARS: usize = 200;
const KEYWORD_LIMIT: usize = 10;
const LINK_LIMIT: usize = 5;

static DESCRIPTOR: Lazy<BackendDescriptor> = Lazy::new(|| {
    BackendDescriptor::new(
        NAME,
        &[OutputFormat::Html, OutputFormat::Structured],
        BackendVariant::StructuralExtraction,
    )
});

/// 选择器提取后端
///
/// 抓取原始HTML并通过CSS选择器做结构化提取，不提供Markdown
pub struct SelectorEngine {
    client: reqwest::Client,
}

struct FetchedPage {
    final_url: String,
    status_code: u16,
    content_type: Option<String>,
    html: String,
}

impl SelectorEngine {
    pub fn new(settings: &HttpEngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    pub fn descriptor() -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, EngineError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let html = resp.text().await?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            html,
        })
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
        config: &CrawlConfig,
    ) -> Result<RawEngineOutput, EngineError> {
        // 选择器在发起请求之前校验
        let rules = ExtractionService::parse_rules(config.backend_option(SELECTORS_OPTION))?;

        let page = within_timeout(config.timeout(), self.fetch(url, config.timeout())).await?;
        debug!(
            "Fetched {} with status {} ({} bytes)",
            page.final_url,
            page.status_code,
            page.html.len()
        );

        let links = content_extraction::extract_links(&page.html, &page.final_url);
        let meta = content_extraction::extract_metadata(&page.html);

        let mut raw = RawEngineOutput::new(page.final_url.clone())
            .with_meta("title", meta.title.clone())
            .with_meta("status_code", page.status_code)
            .with_meta("links_count", links.len())
            .with_meta("content_type", page.content_type.clone());

        if format == OutputFormat::Structured {
            raw = raw.with_structured(structured_data(&page, meta.title, &links, &rules)?);
        }

        Ok(raw.with_html(page.html))
    }
}

fn structured_data(
    page: &FetchedPage,
    title: Option<String>,
    links: &[String],
    rules: &[(String, ExtractionRule)],
) -> Result<serde_json::Map<String, Value>, EngineError> {
    let text = content_extraction::visible_text(&page.html);

    let mut data = serde_json::Map::new();
    data.insert("title".to_string(), json!(title.unwrap_or_default()));
    data.insert(
        "summary".to_string(),
        json!(content_extraction::summarize(&text, SUMMARY_CHARS)),
    );
    data.insert(
        "keywords".to_string(),
        json!(content_extraction::extract_keywords(&text, KEYWORD_LIMIT)),
    );
    data.insert(
        "links".to_string(),
        json!(links.iter().take(LINK_LIMIT).collect::<Vec<_>>()),
    );

    for (key, value) in ExtractionService::extract(&page.html, rules)? {
        data.insert(key, value);
    }

    Ok(data)
}

#[async_trait]
impl CrawlBackend for SelectorEngine {
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
        let raw = self.scrape(url, format, config).await.map_err(|e| {
            warn!("Selector extraction failed for {}: {}", url, e);
            e.into_crawl_error(NAME, url, config.timeout())
        })?;

        Ok(normalize(raw, format, NAME, start.elapsed().as_millis() as u64))
    }
}
