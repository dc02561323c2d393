// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::models::crawl_result::OutputFormat;

/// 配置校验错误
///
/// 在任何后端被调用之前产生，指明出错的字段及原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    /// 出错的字段名
    pub field: String,
    /// 人类可读的原因
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 错误种类
///
/// 与具体错误载荷无关的分类标签，用于日志、指标以及结果中的错误记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    UnknownBackend,
    UnsupportedFormat,
    Timeout,
    Authentication,
    Engine,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnknownBackend => "unknown_backend",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Engine => "engine",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 爬取错误
///
/// 所有后端失败最终都会被归一化为这里的某一种，调用方无需了解具体引擎的错误类型
#[derive(Error, Debug)]
pub enum CrawlError {
    /// 配置或输入不合法，在任何I/O之前检测
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 请求的后端未注册
    #[error("unknown backend `{backend}` requested for {url}")]
    UnknownBackend { backend: String, url: String },

    /// 后端不支持请求的输出格式
    #[error("backend `{backend}` does not support format `{format}` requested for {url}")]
    UnsupportedFormat {
        backend: String,
        url: String,
        format: OutputFormat,
    },

    /// 引擎在配置的超时时间内未完成
    #[error("backend `{backend}` timed out after {timeout_secs}s while crawling {url}")]
    Timeout {
        backend: String,
        url: String,
        timeout_secs: f64,
    },

    /// API密钥缺失或无效
    #[error("backend `{backend}` rejected credentials for {url}: {message}")]
    Authentication {
        backend: String,
        url: String,
        message: String,
    },

    /// 其他引擎失败（网络、解析、浏览器、模型等），保留原始错误作为 source
    #[error("backend `{backend}` failed while crawling {url}: {message}")]
    Engine {
        backend: String,
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CrawlError {
    /// 构造不带原始错误的引擎错误
    pub fn engine(
        backend: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CrawlError::Engine {
            backend: backend.into(),
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// 错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::Validation(_) => ErrorKind::Validation,
            CrawlError::UnknownBackend { .. } => ErrorKind::UnknownBackend,
            CrawlError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            CrawlError::Timeout { .. } => ErrorKind::Timeout,
            CrawlError::Authentication { .. } => ErrorKind::Authentication,
            CrawlError::Engine { .. } => ErrorKind::Engine,
        }
    }

    /// 产生该错误的后端名称（校验错误没有后端）
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            CrawlError::Validation(_) => None,
            CrawlError::UnknownBackend { backend, .. }
            | CrawlError::UnsupportedFormat { backend, .. }
            | CrawlError::Timeout { backend, .. }
            | CrawlError::Authentication { backend, .. }
            | CrawlError::Engine { backend, .. } => Some(backend),
        }
    }

    /// 出错时正在爬取的URL
    pub fn url(&self) -> Option<&str> {
        match self {
            CrawlError::Validation(_) => None,
            CrawlError::UnknownBackend { url, .. }
            | CrawlError::UnsupportedFormat { url, .. }
            | CrawlError::Timeout { url, .. }
            | CrawlError::Authentication { url, .. }
            | CrawlError::Engine { url, .. } => Some(url),
        }
    }

    /// 是否在请求到达后端之前就能判定（对同一后端的后续请求同样会失败）
    pub fn is_fatal_for_backend(&self) -> bool {
        matches!(
            self,
            CrawlError::Validation(_)
                | CrawlError::UnknownBackend { .. }
                | CrawlError::UnsupportedFormat { .. }
                | CrawlError::Authentication { .. }
        )
    }
}

/// 缓存层错误
///
/// 只在缓存层内部流转，永远不会作为爬取失败暴露给调用方
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}
