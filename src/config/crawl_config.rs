// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use validator::Validate;

use crate::config::settings::CrawlSettings;
use crate::domain::models::crawl_result::OutputFormat;
use crate::utils::errors::ValidationError;

/// 未经校验的爬取配置输入
///
/// 字段类型刻意宽松（例如超时为浮点数、TTL 为有符号整数），由 [`CrawlConfig::validate`] 统一校验
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CrawlConfigInput {
    /// 超时时间（秒），必须为正数
    #[validate(range(exclusive_min = 0.0, message = "must be positive"))]
    pub timeout: f64,
    /// 输出格式 (markdown, html, structured)
    pub format: String,
    /// API密钥（按后端使用）
    pub api_key: Option<String>,
    /// 是否启用缓存
    pub cache_enabled: bool,
    /// 缓存TTL（秒），不能为负
    #[validate(range(min = 0, message = "must be non-negative"))]
    pub cache_ttl: i64,
    /// 后端特定的透传选项
    pub backend_options: HashMap<String, Value>,
}

impl Default for CrawlConfigInput {
    fn default() -> Self {
        Self {
            timeout: 30.0,
            format: OutputFormat::Markdown.as_str().to_string(),
            api_key: None,
            cache_enabled: true,
            cache_ttl: 3600,
            backend_options: HashMap::new(),
        }
    }
}

/// 已校验的爬取配置
///
/// 校验通过后只读，后端只能通过 `&CrawlConfig` 读取，无法修改
#[derive(Clone, PartialEq)]
pub struct CrawlConfig {
    timeout: Duration,
    format: OutputFormat,
    api_key: Option<String>,
    cache_enabled: bool,
    cache_ttl: Duration,
    backend_options: HashMap<String, Value>,
}

impl CrawlConfig {
    /// 校验原始输入并生成配置
    ///
    /// # 参数
    ///
    /// * `raw` - 未经校验的输入
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlConfig)` - 校验通过的配置
    /// * `Err(ValidationError)` - 第一个不合法的字段及原因
    pub fn validate(raw: CrawlConfigInput) -> Result<Self, ValidationError> {
        if let Err(errors) = raw.validate() {
            let field_errors = errors.field_errors();
            let mut fields: Vec<_> = field_errors.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            if let Some((field, errs)) = fields.first() {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is out of range".to_string());
                return Err(ValidationError::new(field.to_string(), reason));
            }
        }

        if !raw.timeout.is_finite() {
            return Err(ValidationError::new("timeout", "must be a finite number"));
        }
        let timeout = Duration::try_from_secs_f64(raw.timeout)
            .map_err(|e| ValidationError::new("timeout", e.to_string()))?;

        let format: OutputFormat = raw.format.parse()?;

        let api_key = raw.api_key.filter(|key| !key.trim().is_empty());

        Ok(Self {
            timeout,
            format,
            api_key,
            cache_enabled: raw.cache_enabled,
            cache_ttl: Duration::from_secs(raw.cache_ttl as u64),
            backend_options: raw.backend_options,
        })
    }

    /// 从进程级默认设置构建配置
    pub fn from_settings(settings: &CrawlSettings) -> Result<Self, ValidationError> {
        Self::validate(CrawlConfigInput {
            timeout: settings.timeout_secs,
            format: settings.format.clone(),
            cache_enabled: settings.cache_enabled,
            cache_ttl: settings.cache_ttl_secs,
            ..Default::default()
        })
    }

    /// 以默认值为起点构建配置
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn backend_options(&self) -> &HashMap<String, Value> {
        &self.backend_options
    }

    /// 读取某个后端选项
    pub fn backend_option(&self, key: &str) -> Option<&Value> {
        self.backend_options.get(key)
    }
}

impl fmt::Debug for CrawlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlConfig")
            .field("timeout", &self.timeout)
            .field("format", &self.format)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_ttl", &self.cache_ttl)
            .field("backend_options", &self.backend_options)
            .finish()
    }
}

/// 爬取配置构建器
///
/// `build` 走与 [`CrawlConfig::validate`] 相同的校验路径
#[derive(Debug, Clone, Default)]
pub struct CrawlConfigBuilder {
    input: CrawlConfigInput,
}

impl CrawlConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.input.timeout = timeout.as_secs_f64();
        self
    }

    pub fn timeout_secs(mut self, seconds: f64) -> Self {
        self.input.timeout = seconds;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.input.format = format.as_str().to_string();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.input.api_key = Some(api_key.into());
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.input.cache_enabled = enabled;
        self
    }

    pub fn cache_ttl_secs(mut self, seconds: i64) -> Self {
        self.input.cache_ttl = seconds;
        self
    }

    pub fn backend_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.backend_options.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<CrawlConfig, ValidationError> {
        CrawlConfig::validate(self.input)
    }
}
