// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::crawl_config::CrawlConfig;
use crate::config::settings::BrowserAgentSettings;
use crate::domain::models::crawl_result::{
    normalize, CrawlResult, OutputFormat, RawEngineOutput,
};
use crate::domain::services::llm_service::{
    strip_code_fences, CompletionRequest, LanguageModel, OpenAiCompatibleModel,
};
use crate::engines::browser_session::{BrowserSession, ChromiumSession};
use crate::engines::traits::{
    ensure_supported, resolve_api_key, within_timeout, BackendDescriptor, BackendVariant,
    CrawlBackend, EngineError,
};
use crate::utils::content_extraction;
use crate::utils::errors::CrawlError;

/// 后端名称
pub const NAME: &str = "browser-agent";

const SYSTEM_PROMPT: &str = "You are a web content extraction agent. \
    You receive the rendered content of a web page and a task. \
    Answer with the extracted content only, without commentary.";

static DESCRIPTOR: Lazy<BackendDescriptor> = Lazy::new(|| {
    BackendDescriptor::new(NAME, &OutputFormat::ALL, BackendVariant::AiDriven).requiring_api_key()
});

/// AI 浏览器代理后端
///
/// 浏览器渲染页面后交给语言模型，按请求格式完成提取任务
pub struct BrowserAgentEngine {
    session: Arc<dyn BrowserSession>,
    model: Arc<dyn LanguageModel>,
    fallback_api_key: Option<String>,
    max_content_chars: usize,
}

impl BrowserAgentEngine {
    pub fn new(settings: &BrowserAgentSettings) -> Self {
        Self::with_collaborators(
            settings,
            Arc::new(ChromiumSession::new(settings.remote_debugging_url.clone())),
            Arc::new(OpenAiCompatibleModel::new(
                settings.llm_base_url.clone(),
                settings.llm_model.clone(),
            )),
        )
    }

    /// 使用自定义的浏览器会话和模型创建后端
    pub fn with_collaborators(
        settings: &BrowserAgentSettings,
        session: Arc<dyn BrowserSession>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            session,
            model,
            fallback_api_key: settings.api_key.clone(),
            max_content_chars: settings.max_content_chars,
        }
    }

    pub fn descriptor() -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    async fn run_agent(
        &self,
        url: &str,
        format: OutputFormat,
        api_key: String,
        config: &CrawlConfig,
    ) -> Result<RawEngineOutput, EngineError> {
        let page = self.session.open(url, config.timeout()).await?;

        let content = match format {
            OutputFormat::Html => page.html.clone(),
            _ => content_extraction::html_to_markdown(&page.html),
        };
        let content: String = content.chars().take(self.max_content_chars).collect();
        debug!(
            "Prompting model with {} chars of {} for {}",
            content.chars().count(),
            page.final_url,
            format
        );

        let completion = self
            .model
            .complete(CompletionRequest {
                api_key,
                system: SYSTEM_PROMPT.to_string(),
                prompt: format!("{}\n\nPage content:\n{}", task_prompt(url, format), content),
                timeout: config.timeout(),
            })
            .await?;

        let answer = strip_code_fences(&completion.content);
        let mut raw = RawEngineOutput::new(page.final_url.clone())
            .with_meta("ai_backend", NAME)
            .with_meta("content_length", answer.chars().count())
            .with_meta("format_requested", format.as_str())
            .with_meta("title", page.title.clone())
            .with_meta("model", completion.model.clone())
            .with_meta("prompt_tokens", completion.usage.prompt_tokens)
            .with_meta("completion_tokens", completion.usage.completion_tokens)
            .with_meta("total_tokens", completion.usage.total_tokens);

        raw = match format {
            OutputFormat::Markdown => raw.with_markdown(answer),
            OutputFormat::Html => raw.with_html(answer),
            OutputFormat::Structured => match serde_json::from_str::<Value>(answer) {
                Ok(Value::Object(map)) => raw.with_structured(map),
                Ok(other) => {
                    return Err(EngineError::SchemaMismatch(format!(
                        "expected a JSON object, model returned {}",
                        json_type(&other)
                    )))
                }
                Err(e) => {
                    return Err(EngineError::SchemaMismatch(format!(
                        "model answer is not valid JSON: {}",
                        e
                    )))
                }
            },
        };

        Ok(raw)
    }
}

#[async_trait]
impl CrawlBackend for BrowserAgentEngine {
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
                message: "no model API key configured".to_string(),
            }
        })?;

        let start = Instant::now();
        let raw = within_timeout(config.timeout(), self.run_agent(url, format, api_key, config))
            .await
            .map_err(|e| {
                warn!("Browser agent failed for {}: {}", url, e);
                e.into_crawl_error(NAME, url, config.timeout())
            })?;

        Ok(normalize(raw, format, NAME, start.elapsed().as_millis() as u64))
    }
}

/// 按输出格式生成任务描述
fn task_prompt(url: &str, format: OutputFormat) -> String {
    let base_task = format!("Navigate to {} and extract content", url);
    match format {
        OutputFormat::Markdown => format!(
            "{}. Convert the main content to markdown format, preserving structure with \
             headers, paragraphs, and lists. Focus on the primary text content, ignoring \
             navigation and ads.",
            base_task
        ),
        OutputFormat::Html => format!(
            "{}. Extract the raw HTML source of the main content area. Include the HTML \
             tags and structure.",
            base_task
        ),
        OutputFormat::Structured => format!(
            "{}. Extract structured information including page title, main headings, key \
             paragraphs, important links and any data tables. Return a single JSON object \
             with the keys \"title\", \"headings\", \"paragraphs\", \"links\" and \"tables\".",
            base_task
        ),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
