// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::crawl_config::CrawlConfig;
use crate::domain::models::crawl_result::{CrawlResult, OutputFormat};
use crate::utils::errors::CrawlError;

/// 后端种类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendVariant {
    /// 托管的生产级抓取API
    ProductionApi,
    /// 本地抓取与渲染
    LocalRendering,
    /// 基于CSS选择器的结构化提取
    StructuralExtraction,
    /// 浏览器加大模型驱动
    AiDriven,
}

/// 后端静态描述信息
///
/// 注册表在分发之前根据它校验格式，无需实例化后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    name: String,
    formats: Vec<OutputFormat>,
    requires_api_key: bool,
    variant: BackendVariant,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, formats: &[OutputFormat], variant: BackendVariant) -> Self {
        Self {
            name: name.into(),
            formats: formats.to_vec(),
            requires_api_key: false,
            variant,
        }
    }

    /// 标记该后端需要API密钥
    pub fn requiring_api_key(mut self) -> Self {
        self.requires_api_key = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    pub fn requires_api_key(&self) -> bool {
        self.requires_api_key
    }

    pub fn variant(&self) -> BackendVariant {
        self.variant
    }

    /// 是否支持指定输出格式
    pub fn supports(&self, format: OutputFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// 爬取后端特质
///
/// 所有变体都实现同一契约，分发器从不按变体分支
#[async_trait]
pub trait CrawlBackend: Send + Sync {
    /// 静态描述信息
    fn descriptor(&self) -> &BackendDescriptor;

    /// 后端名称
    fn name(&self) -> &str {
        self.descriptor().name()
    }

    /// 执行一次爬取
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `format` - 请求的输出格式
    /// * `config` - 已校验的爬取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlResult)` - 归一化的结果，`cache_hit` 为 false
    /// * `Err(CrawlError)` - 归一化后的错误
    async fn crawl(
        &self,
        url: &str,
        format: OutputFormat,
        config: &CrawlConfig,
    ) -> Result<CrawlResult, CrawlError>;
}

/// 校验后端是否支持请求的格式，不支持时不做任何I/O直接返回错误
pub fn ensure_supported(
    descriptor: &BackendDescriptor,
    url: &str,
    format: OutputFormat,
) -> Result<(), CrawlError> {
    if descriptor.supports(format) {
        Ok(())
    } else {
        Err(CrawlError::UnsupportedFormat {
            backend: descriptor.name().to_string(),
            url: url.to_string(),
            format,
        })
    }
}

/// 解析本次爬取使用的API密钥
///
/// 优先使用配置中的密钥，其次使用进程级兜底密钥
pub fn resolve_api_key(config: &CrawlConfig, fallback: Option<&str>) -> Option<String> {
    config
        .api_key()
        .or(fallback)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// 在超时时间内执行引擎操作
pub async fn within_timeout<T, F>(timeout: Duration, operation: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| EngineError::Timeout)?
}

/// 引擎错误类型
///
/// 只在后端适配器内部使用，离开适配器前通过 [`EngineError::into_crawl_error`] 归一化
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// HTTP状态码错误
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
    /// 认证失败
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// 被限流
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 选择器不合法
    #[error("Invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    /// 响应解析失败
    #[error("Parse error: {0}")]
    Parse(String),
    /// 浏览器错误
    #[error("Browser error: {0}")]
    Browser(String),
    /// 模型调用错误
    #[error("Model error: {0}")]
    Model(String),
    /// 模型输出不符合期望的结构
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 根据HTTP状态码构造错误
    ///
    /// 401/403 视为认证失败，429 视为限流，408/504 视为超时
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EngineError::Unauthorized(message),
            StatusCode::TOO_MANY_REQUESTS => EngineError::RateLimited(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EngineError::Timeout,
            _ => EngineError::HttpStatus {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// 判断错误是否可重试
    ///
    /// 分发层不做自动重试，供调用方自行决定
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            EngineError::HttpStatus { status, .. } => *status >= 500,
            EngineError::Timeout | EngineError::RateLimited(_) => true,
            _ => false,
        }
    }

    /// 归一化为对外的错误分类
    ///
    /// # 参数
    ///
    /// * `backend` - 后端名称
    /// * `url` - 正在爬取的URL
    /// * `timeout` - 本次爬取的超时时间，用于超时错误信息
    pub fn into_crawl_error(self, backend: &str, url: &str, timeout: Duration) -> CrawlError {
        match self {
            EngineError::Timeout => timeout_error(backend, url, timeout),
            EngineError::RequestFailed(e) if e.is_timeout() => timeout_error(backend, url, timeout),
            EngineError::Unauthorized(message) => CrawlError::Authentication {
                backend: backend.to_string(),
                url: url.to_string(),
                message,
            },
            other => CrawlError::Engine {
                backend: backend.to_string(),
                url: url.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

fn timeout_error(backend: &str, url: &str, timeout: Duration) -> CrawlError {
    CrawlError::Timeout {
        backend: backend.to_string(),
        url: url.to_string(),
        timeout_secs: timeout.as_secs_f64(),
    }
}
