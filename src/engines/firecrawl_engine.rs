// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::crawl_config::CrawlConfig;
use crate::config::settings::FirecrawlSettings;
use crate::domain::models::crawl_result::{
    normalize, CrawlResult, OutputFormat, RawEngineOutput,
};
use crate::engines::traits::{
    ensure_supported, resolve_api_key, BackendDescriptor, BackendVariant, CrawlBackend,
    EngineError,
};
use crate::utils::errors::CrawlError;

/// 后端名称
pub const NAME: &str = "firecrawl";

static DESCRIPTOR: Lazy<BackendDescriptor> = Lazy::new(|| {
    BackendDescriptor::new(NAME, &OutputFormat::ALL, BackendVariant::ProductionApi)
        .requiring_api_key()
});

#[derive(Deserialize, Debug)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ScrapeData {
    markdown: Option<String>,
    raw_html: Option<String>,
    html: Option<String>,
    json: Option<Value>,
    metadata: Option<Map<String, Value>>,
}

/// Firecrawl 后端
///
/// 通过托管的 Firecrawl API 抓取页面，需要API密钥
pub struct FirecrawlEngine {
    client: reqwest::Client,
    base_url: String,
    fallback_api_key: Option<String>,
}

impl FirecrawlEngine {
    pub fn new(settings: &FirecrawlSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            fallback_api_key: settings.api_key.clone(),
        }
    }

    pub fn descriptor() -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    fn request_body(url: &str, format: OutputFormat, config: &CrawlConfig) -> Value {
        let mut body = json!({
            "url": url,
            "formats": [remote_format(format)],
            "timeout": config.timeout().as_millis() as u64,
        });

        if format == OutputFormat::Structured {
            body["jsonOptions"] = json!({
                "schema": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "summary": { "type": "string" },
                        "keywords": { "type": "array", "items": { "type": "string" } }
                    }
                }
            });
        }

        // 透传后端选项，但不允许覆盖目标URL
        if let Value::Object(ref mut map) = body {
            for (key, value) in config.backend_options() {
                if key != "url" {
                    map.insert(key.clone(), value.clone());
                }
            }
        }

        body
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
        api_key: &str,
        config: &CrawlConfig,
    ) -> Result<RawEngineOutput, EngineError> {
        let endpoint = format!("{}/v1/scrape", self.base_url);
        debug!("Sending scrape request to {} for {}", endpoint, url);

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(config.timeout())
            .json(&Self::request_body(url, format, config))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::from_status(status, error_message(&body)));
        }

        let parsed: ScrapeResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        if !parsed.success {
            return Err(EngineError::Other(
                parsed
                    .error
                    .unwrap_or_else(|| "Firecrawl reported failure".to_string()),
            ));
        }

        let data = parsed.data.unwrap_or_default();
        Ok(raw_output(url, data))
    }
}

#[async_trait]
impl CrawlBackend for FirecrawlEngine {
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

        let api_key = resolve_api_key(config, self.fallback_api_key.as_deref()).ok_or_else(|| {
            CrawlError::Authentication {
                backend: NAME.to_string(),
                url: url.to_string(),
                message: "no API key configured".to_string(),
            }
        })?;

        let start = Instant::now();
        let raw = self
            .scrape(url, format, &api_key, config)
            .await
            .map_err(|e| {
                warn!("Firecrawl scrape failed for {}: {}", url, e);
                e.into_crawl_error(NAME, url, config.timeout())
            })?;

        Ok(normalize(raw, format, NAME, start.elapsed().as_millis() as u64))
    }
}

fn remote_format(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Markdown => "markdown",
        OutputFormat::Html => "rawHtml",
        OutputFormat::Structured => "json",
    }
}

fn raw_output(url: &str, data: ScrapeData) -> RawEngineOutput {
    let remote_meta = data.metadata.unwrap_or_default();

    let final_url = remote_meta
        .get("sourceURL")
        .or_else(|| remote_meta.get("url"))
        .and_then(Value::as_str)
        .unwrap_or(url)
        .to_string();

    let mut raw = RawEngineOutput::new(final_url);
    raw.markdown = data.markdown;
    raw.html = data.raw_html.or(data.html);
    raw.structured = match data.json {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };

    for (key, value) in remote_meta {
        let key = match key.as_str() {
            "statusCode" => "status_code".to_string(),
            "contentType" => "content_type".to_string(),
            "sourceURL" => continue,
            _ => key,
        };
        raw = raw.with_meta(&key, value);
    }

    raw
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
#[path = "firecrawl_engine_test.rs"]
mod tests;
