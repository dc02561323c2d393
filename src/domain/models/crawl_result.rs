// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::utils::content_extraction;
use crate::utils::errors::{CrawlError, ErrorKind, ValidationError};

/// 元数据映射（title、description、status_code、content_type 等）
pub type Metadata = Map<String, Value>;

const SUMMARY_CHARS: usize = 200;
const KEYWORD_LIMIT: usize = 10;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown文本
    Markdown,
    /// 原始HTML
    Html,
    /// 结构化提取数据
    Structured,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::Markdown,
        OutputFormat::Html,
        OutputFormat::Structured,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
            OutputFormat::Structured => "structured",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            "structured" => Ok(OutputFormat::Structured),
            other => Err(ValidationError::new(
                "format",
                format!(
                    "unknown format `{}`, expected one of markdown, html, structured",
                    other
                ),
            )),
        }
    }
}

/// 结果中的错误记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

/// 引擎原始输出
///
/// 后端适配器把各自引擎返回的内容装进这里，再交给 [`normalize`] 统一成 [`CrawlResult`]。
/// 引擎可以同时给出多种内容形式，归一化时只保留请求的那一种。
#[derive(Debug, Clone, Default)]
pub struct RawEngineOutput {
    pub final_url: String,
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub structured: Option<Map<String, Value>>,
    pub metadata: Option<Metadata>,
}

impl RawEngineOutput {
    pub fn new(final_url: impl Into<String>) -> Self {
        Self {
            final_url: final_url.into(),
            ..Default::default()
        }
    }

    pub fn with_markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_structured(mut self, structured: Map<String, Value>) -> Self {
        self.structured = Some(structured);
        self
    }

    /// 写入一项元数据，值为 `Null` 时忽略
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.metadata
                .get_or_insert_with(Map::new)
                .insert(key.to_string(), value);
        }
        self
    }
}

/// 归一化的爬取结果
///
/// 未出错时，`markdown`、`raw_html`、`structured_data` 中恰好有一个被填充（与请求格式对应）；
/// 出错时三者都为空。结果一旦返回即不可变，缓存命中时只翻转 `cache_hit`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    url: String,
    markdown: Option<String>,
    raw_html: Option<String>,
    structured_data: Option<Map<String, Value>>,
    metadata: Metadata,
    timing_ms: u64,
    cache_hit: bool,
    backend_name: String,
    error: Option<ErrorRecord>,
}

impl CrawlResult {
    /// 构造一个失败结果，所有内容字段为空
    pub fn failed(url: impl Into<String>, backend_name: impl Into<String>, error: &CrawlError) -> Self {
        Self {
            url: url.into(),
            markdown: None,
            raw_html: None,
            structured_data: None,
            metadata: Metadata::new(),
            timing_ms: 0,
            cache_hit: false,
            backend_name: backend_name.into(),
            error: Some(ErrorRecord {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    /// 返回 `cache_hit` 被设置为给定值的副本
    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn markdown(&self) -> Option<&str> {
        self.markdown.as_deref()
    }

    pub fn raw_html(&self) -> Option<&str> {
        self.raw_html.as_deref()
    }

    pub fn structured_data(&self) -> Option<&Map<String, Value>> {
        self.structured_data.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn timing_ms(&self) -> u64 {
        self.timing_ms
    }

    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// 被填充的内容字段对应的格式
    pub fn format(&self) -> Option<OutputFormat> {
        if self.markdown.is_some() {
            Some(OutputFormat::Markdown)
        } else if self.raw_html.is_some() {
            Some(OutputFormat::Html)
        } else if self.structured_data.is_some() {
            Some(OutputFormat::Structured)
        } else {
            None
        }
    }

    /// 元数据中的标题
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// 将引擎原始输出归一化为 [`CrawlResult`]
///
/// # 参数
///
/// * `raw` - 引擎原始输出
/// * `requested` - 请求的输出格式
/// * `backend_name` - 产生结果的后端名称
/// * `elapsed_ms` - 引擎耗时（毫秒）
///
/// # 返回值
///
/// 只填充与 `requested` 对应的内容字段的结果。引擎没有直接给出该形式时尽量推导：
/// Markdown 由 HTML 转换而来，结构化数据回退为 `{title, summary, keywords}`。
pub fn normalize(
    raw: RawEngineOutput,
    requested: OutputFormat,
    backend_name: &str,
    elapsed_ms: u64,
) -> CrawlResult {
    let metadata = raw.metadata.clone().unwrap_or_default();

    let (markdown, raw_html, structured_data) = match requested {
        OutputFormat::Markdown => {
            let markdown = match (raw.markdown, raw.html) {
                (Some(markdown), _) => markdown,
                (None, Some(html)) => content_extraction::html_to_markdown(&html),
                (None, None) => String::new(),
            };
            (Some(markdown), None, None)
        }
        OutputFormat::Html => (None, Some(raw.html.unwrap_or_default()), None),
        OutputFormat::Structured => {
            let structured = match raw.structured {
                Some(structured) => structured,
                None => fallback_structured(&metadata, raw.markdown.as_deref(), raw.html.as_deref()),
            };
            (None, None, Some(structured))
        }
    };

    CrawlResult {
        url: raw.final_url,
        markdown,
        raw_html,
        structured_data,
        metadata,
        timing_ms: elapsed_ms,
        cache_hit: false,
        backend_name: backend_name.to_string(),
        error: None,
    }
}

fn fallback_structured(
    metadata: &Metadata,
    markdown: Option<&str>,
    html: Option<&str>,
) -> Map<String, Value> {
    let text = match (markdown, html) {
        (Some(markdown), _) => markdown.to_string(),
        (None, Some(html)) => content_extraction::visible_text(html),
        (None, None) => String::new(),
    };

    let title = metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| content_extraction::first_meaningful_line(&text))
        .unwrap_or_default();

    let fallback = json!({
        "title": title,
        "summary": content_extraction::summarize(&text, SUMMARY_CHARS),
        "keywords": content_extraction::extract_keywords(&text, KEYWORD_LIMIT),
    });

    match fallback {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
