// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::crawl_config::CrawlConfig;
use crate::domain::models::crawl_result::CrawlResult;
use crate::engines::dispatcher::CrawlDispatcher;
use crate::utils::content_extraction;
use crate::utils::errors::{CrawlError, ErrorKind};
use crate::utils::url_utils::{normalize_url, parse_crawl_url, resolve_url, same_host};

/// 递归爬取的限制条件
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlLimits {
    /// 最大深度，起始页深度为 0
    pub max_depth: usize,
    /// 总共尝试爬取的最大页面数
    pub max_pages: usize,
    /// 每一层尝试爬取的最大页面数
    pub max_pages_per_level: usize,
    /// 每个页面最多跟进的链接数
    pub max_links_per_page: usize,
    /// 只跟进与起始页同主机的链接
    pub same_domain: bool,
    /// 两次请求之间的间隔
    pub delay: Duration,
    /// 链接必须包含其中之一（为空时不限制）
    pub include_patterns: Vec<String>,
    /// 链接不能包含其中任何一个
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 20,
            max_pages_per_level: 10,
            max_links_per_page: 5,
            same_domain: true,
            delay: Duration::ZERO,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// 爬取成功的页面
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawledPage {
    pub depth: usize,
    pub result: CrawlResult,
}

/// 爬取失败的页面
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlFailure {
    pub depth: usize,
    pub url: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// 递归爬取报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecursiveCrawlReport {
    pub start_url: String,
    pub pages: Vec<CrawledPage>,
    pub failures: Vec<CrawlFailure>,
}

impl RecursiveCrawlReport {
    /// 实际到达的最大深度
    pub fn max_depth_reached(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.depth)
            .chain(self.failures.iter().map(|f| f.depth))
            .max()
            .unwrap_or(0)
    }

    /// 每一层成功爬取的页面数
    pub fn depth_breakdown(&self) -> BTreeMap<usize, usize> {
        let mut breakdown = BTreeMap::new();
        for page in &self.pages {
            *breakdown.entry(page.depth).or_insert(0) += 1;
        }
        breakdown
    }

    pub fn total_attempted(&self) -> usize {
        self.pages.len() + self.failures.len()
    }
}

/// 爬取服务
///
/// 在分发器之上提供批量爬取与按深度限制的递归爬取
pub struct CrawlService {
    dispatcher: Arc<CrawlDispatcher>,
}

impl CrawlService {
    pub fn new(dispatcher: Arc<CrawlDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &CrawlDispatcher {
        &self.dispatcher
    }

    /// 批量爬取
    ///
    /// # 参数
    ///
    /// * `urls` - 待爬取的URL
    /// * `config` - 爬取配置
    /// * `backend` - 后端名称
    /// * `concurrency` - 最大并发数
    ///
    /// # 返回值
    ///
    /// 与输入顺序一致的结果列表，失败的URL以带错误记录的结果表示
    pub async fn crawl_batch<S: AsRef<str>>(
        &self,
        urls: &[S],
        config: &CrawlConfig,
        backend: &str,
        concurrency: usize,
    ) -> Vec<CrawlResult> {
        info!(
            "Starting batch crawl of {} urls via {} (concurrency {})",
            urls.len(),
            backend,
            concurrency.max(1)
        );

        stream::iter(urls.iter().map(|url| url.as_ref()))
            .map(|url| async move {
                match self.dispatcher.dispatch(url, config, backend).await {
                    Ok(result) => result,
                    Err(e) => CrawlResult::failed(url, backend, &e),
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// 按深度限制的广度优先递归爬取
    ///
    /// # 参数
    ///
    /// * `start_url` - 起始URL
    /// * `config` - 爬取配置
    /// * `backend` - 后端名称
    /// * `limits` - 深度、页数、域名等限制
    ///
    /// # 返回值
    ///
    /// * `Ok(RecursiveCrawlReport)` - 各页面结果及失败列表
    /// * `Err(CrawlError)` - 起始URL不合法，或出现对该后端必然重复的错误
    ///   （未知后端、不支持的格式、认证失败）
    pub async fn crawl_recursive(
        &self,
        start_url: &str,
        config: &CrawlConfig,
        backend: &str,
        limits: &CrawlLimits,
    ) -> Result<RecursiveCrawlReport, CrawlError> {
        let start = parse_crawl_url(start_url)?;
        let start_url = start.to_string();

        info!(
            "Starting recursive crawl from {} via {} (max depth {}, max pages {})",
            start_url, backend, limits.max_depth, limits.max_pages
        );

        let mut report = RecursiveCrawlReport {
            start_url: start_url.clone(),
            pages: Vec::new(),
            failures: Vec::new(),
        };

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(normalize_url(&start_url));
        let mut current_level = vec![start_url.clone()];

        'levels: for depth in 0..=limits.max_depth {
            if current_level.is_empty() {
                break;
            }

            let mut next_level = Vec::new();
            let mut attempted_at_level = 0;

            for url in current_level {
                if report.total_attempted() >= limits.max_pages {
                    break 'levels;
                }
                if attempted_at_level >= limits.max_pages_per_level {
                    break;
                }

                if report.total_attempted() > 0 && !limits.delay.is_zero() {
                    tokio::time::sleep(limits.delay).await;
                }
                attempted_at_level += 1;

                debug!("Crawling depth {}: {}", depth, url);
                match self.dispatcher.dispatch(&url, config, backend).await {
                    Ok(result) => {
                        if depth < limits.max_depth {
                            let links = LinkDiscoverer::discover(&result);
                            let followed = LinkDiscoverer::filter_links(
                                links,
                                &limits.include_patterns,
                                &limits.exclude_patterns,
                            )
                            .into_iter()
                            .filter(|link| !limits.same_domain || same_host(link, &start_url))
                            .filter(|link| seen.insert(normalize_url(link)))
                            .take(limits.max_links_per_page);
                            next_level.extend(followed);
                        }
                        report.pages.push(CrawledPage { depth, result });
                    }
                    Err(e) if e.is_fatal_for_backend() => return Err(e),
                    Err(e) => {
                        warn!("Recursive crawl skipped {}: {}", url, e);
                        report.failures.push(CrawlFailure {
                            depth,
                            url,
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            info!(
                "Depth {} complete: {} pages queued for next level",
                depth,
                next_level.len()
            );
            current_level = next_level;
        }

        info!(
            "Recursive crawl from {} finished: {} pages, {} failures",
            report.start_url,
            report.pages.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

/// 链接发现器
///
/// 负责从爬取结果中提取和过滤链接
pub struct LinkDiscoverer;

impl LinkDiscoverer {
    /// 从爬取结果中提取链接
    ///
    /// 依次尝试原始HTML中的锚点、Markdown中的内联链接以及结构化数据中的 `links` 字段
    pub fn discover(result: &CrawlResult) -> Vec<String> {
        if let Some(html) = result.raw_html() {
            return content_extraction::extract_links(html, result.url());
        }
        if let Some(markdown) = result.markdown() {
            return content_extraction::extract_markdown_links(markdown, result.url());
        }
        if let Some(data) = result.structured_data() {
            return Self::structured_links(data.get("links"), result.url());
        }
        Vec::new()
    }

    fn structured_links(links: Option<&Value>, base_url: &str) -> Vec<String> {
        let (Some(Value::Array(links)), Ok(base)) = (links, Url::parse(base_url)) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        links
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|href| resolve_url(&base, href).ok())
            .filter(|url| url.scheme() == "http" || url.scheme() == "https")
            .map(|url| url.to_string())
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// 过滤链接
    ///
    /// 根据包含和排除模式过滤链接，保持原有顺序
    ///
    /// # 参数
    ///
    /// * `links` - 原始链接列表
    /// * `include_patterns` - 包含模式列表
    /// * `exclude_patterns` - 排除模式列表
    pub fn filter_links(
        links: Vec<String>,
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Vec<String> {
        links
            .into_iter()
            .filter(|link| {
                // If include patterns are provided, link must match at least one
                let matches_include = include_patterns.is_empty()
                    || include_patterns.iter().any(|p| link.contains(p));

                // Link must NOT match any exclude pattern
                let matches_exclude = exclude_patterns.iter().any(|p| link.contains(p));

                matches_include && !matches_exclude
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "crawl_service_test.rs"]
mod tests;
