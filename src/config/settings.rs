// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 进程级的默认值、各后端的服务地址以及兜底API密钥。
/// 单次爬取的参数由 [`CrawlConfig`](crate::config::crawl_config::CrawlConfig) 显式传入。
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 默认爬取参数
    pub crawl: CrawlSettings,
    /// 缓存配置
    pub cache: CacheSettings,
    /// Firecrawl 远程服务配置
    pub firecrawl: FirecrawlSettings,
    /// 本地渲染后端配置
    pub local: HttpEngineSettings,
    /// 选择器提取后端配置
    pub selector: HttpEngineSettings,
    /// AI 浏览器代理后端配置
    pub browser_agent: BrowserAgentSettings,
}

/// 默认爬取参数
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    /// 超时时间（秒）
    pub timeout_secs: f64,
    /// 输出格式 (markdown, html, structured)
    pub format: String,
    /// 是否启用缓存
    pub cache_enabled: bool,
    /// 缓存TTL（秒）
    pub cache_ttl_secs: i64,
}

/// 缓存配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// 缓存策略 (memory, redis)
    pub strategy: String,
    /// 内存缓存最大条目数
    pub max_entries: usize,
    /// Redis连接URL (当 strategy=redis 时使用)
    pub redis_url: Option<String>,
    /// Redis键前缀
    pub key_prefix: String,
}

/// Firecrawl 配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FirecrawlSettings {
    /// API基础地址
    pub base_url: String,
    /// 兜底API密钥
    pub api_key: Option<String>,
}

/// 基于HTTP抓取的后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct HttpEngineSettings {
    /// User-Agent
    pub user_agent: String,
}

/// AI 浏览器代理配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserAgentSettings {
    /// LLM API基础地址 (OpenAI 兼容)
    pub llm_base_url: String,
    /// 模型名称
    pub llm_model: String,
    /// 兜底API密钥
    pub api_key: Option<String>,
    /// 远程 Chrome 调试地址，为空时本地启动浏览器
    pub remote_debugging_url: Option<String>,
    /// 发送给模型的页面内容最大字符数
    pub max_content_chars: usize,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}` 以及
    /// `CRAWLSTUDIO__` 前缀的环境变量。常见的 `FIRECRAWL_API_KEY`、`OPENAI_API_KEY`
    /// 环境变量只作为兜底密钥，优先级与内置默认值相同。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults(
            std::env::var("FIRECRAWL_API_KEY").ok(),
            std::env::var("OPENAI_API_KEY").ok(),
        )?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(Environment::with_prefix("CRAWLSTUDIO").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 内置默认值层
    ///
    /// # 参数
    ///
    /// * `firecrawl_key` - Firecrawl 兜底密钥
    /// * `openai_key` - 浏览器代理使用的兜底密钥
    fn defaults(
        firecrawl_key: Option<String>,
        openai_key: Option<String>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = Config::builder()
            // Default crawl settings
            .set_default("crawl.timeout_secs", 30.0)?
            .set_default("crawl.format", "markdown")?
            .set_default("crawl.cache_enabled", true)?
            .set_default("crawl.cache_ttl_secs", 3600)?
            // Default cache settings
            .set_default("cache.strategy", "memory")?
            .set_default("cache.max_entries", 10000)?
            .set_default("cache.key_prefix", "crawlstudio")?
            // Default backend settings
            .set_default("firecrawl.base_url", "https://api.firecrawl.dev")?
            .set_default(
                "local.user_agent",
                "Mozilla/5.0 (compatible; crawlstudio/0.1; +https://crawlstudio.dev)",
            )?
            .set_default(
                "selector.user_agent",
                "Mozilla/5.0 (compatible; crawlstudio/0.1; +https://crawlstudio.dev)",
            )?
            .set_default("browser_agent.llm_base_url", "https://api.openai.com/v1")?
            .set_default("browser_agent.llm_model", "gpt-4o-mini")?
            .set_default("browser_agent.max_content_chars", 12000)?;

        // Fallback keys sit below files and CRAWLSTUDIO__ variables
        if let Some(key) = firecrawl_key {
            builder = builder.set_default("firecrawl.api_key", key)?;
        }
        if let Some(key) = openai_key {
            builder = builder.set_default("browser_agent.api_key", key)?;
        }

        Ok(builder)
    }
}
