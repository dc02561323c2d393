// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::settings::Settings;
use crate::engines::browser_agent_engine::BrowserAgentEngine;
use crate::engines::firecrawl_engine::FirecrawlEngine;
use crate::engines::local_render_engine::LocalRenderEngine;
use crate::engines::selector_engine::SelectorEngine;
use crate::engines::traits::{BackendDescriptor, CrawlBackend};
use crate::utils::errors::CrawlError;

/// 后端工厂
///
/// 参数为触发创建的那次爬取的URL，仅用于错误归属
pub type BackendFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn CrawlBackend>, CrawlError> + Send + Sync>;

struct RegisteredBackend {
    descriptor: BackendDescriptor,
    factory: BackendFactory,
    instance: OnceCell<Arc<dyn CrawlBackend>>,
}

/// 后端注册表
///
/// 按名称保存后端的描述信息和工厂。后端实例在第一次被解析时创建，之后复用。
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, RegisteredBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置后端
    ///
    /// # 参数
    ///
    /// * `settings` - 进程级设置，提供各后端的服务地址和兜底密钥
    pub fn with_default_backends(settings: Arc<Settings>) -> Self {
        let mut registry = Self::new();

        let s = settings.clone();
        registry.register(FirecrawlEngine::descriptor().clone(), move |_| {
            Ok(Arc::new(FirecrawlEngine::new(&s.firecrawl)) as Arc<dyn CrawlBackend>)
        });

        let s = settings.clone();
        registry.register(LocalRenderEngine::descriptor().clone(), move |url| {
            let engine = LocalRenderEngine::new(&s.local).map_err(|e| {
                CrawlError::engine(LocalRenderEngine::descriptor().name(), url, e.to_string())
            })?;
            Ok(Arc::new(engine) as Arc<dyn CrawlBackend>)
        });

        let s = settings.clone();
        registry.register(SelectorEngine::descriptor().clone(), move |url| {
            let engine = SelectorEngine::new(&s.selector).map_err(|e| {
                CrawlError::engine(SelectorEngine::descriptor().name(), url, e.to_string())
            })?;
            Ok(Arc::new(engine) as Arc<dyn CrawlBackend>)
        });

        let s = settings;
        registry.register(BrowserAgentEngine::descriptor().clone(), move |_| {
            Ok(Arc::new(BrowserAgentEngine::new(&s.browser_agent)) as Arc<dyn CrawlBackend>)
        });

        info!("Registered {} default backends", registry.backends.len());
        registry
    }

    /// 注册后端工厂，同名后端会被替换
    pub fn register<F>(&mut self, descriptor: BackendDescriptor, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn CrawlBackend>, CrawlError> + Send + Sync + 'static,
    {
        debug!("Registering backend {}", descriptor.name());
        self.backends.insert(
            descriptor.name().to_string(),
            RegisteredBackend {
                descriptor,
                factory: Box::new(factory),
                instance: OnceCell::new(),
            },
        );
    }

    /// 注册一个已经创建好的后端实例
    pub fn register_instance(&mut self, backend: Arc<dyn CrawlBackend>) {
        let descriptor = backend.descriptor().clone();
        let instance = OnceCell::with_value(backend.clone());
        self.backends.insert(
            descriptor.name().to_string(),
            RegisteredBackend {
                descriptor,
                factory: Box::new(move |_| Ok(backend.clone())),
                instance,
            },
        );
    }

    pub fn descriptor(&self, name: &str) -> Option<&BackendDescriptor> {
        self.backends.get(name).map(|b| &b.descriptor)
    }

    /// 所有后端描述信息，按名称排序
    pub fn descriptors(&self) -> Vec<&BackendDescriptor> {
        let mut descriptors: Vec<_> = self.backends.values().map(|b| &b.descriptor).collect();
        descriptors.sort_by(|a, b| a.name().cmp(b.name()));
        descriptors
    }

    /// 所有后端名称，按名称排序
    pub fn names(&self) -> Vec<&str> {
        self.descriptors().into_iter().map(|d| d.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// 解析后端实例，必要时通过工厂创建
    ///
    /// # 参数
    ///
    /// * `name` - 后端名称
    /// * `url` - 本次爬取的URL，用于错误归属
    ///
    /// # 返回值
    ///
    /// * `Ok(Arc<dyn CrawlBackend>)` - 后端实例（同一名称总是返回同一实例）
    /// * `Err(CrawlError)` - 后端未注册或创建失败
    pub fn resolve(&self, name: &str, url: &str) -> Result<Arc<dyn CrawlBackend>, CrawlError> {
        let registered = self
            .backends
            .get(name)
            .ok_or_else(|| CrawlError::UnknownBackend {
                backend: name.to_string(),
                url: url.to_string(),
            })?;

        registered
            .instance
            .get_or_try_init(|| {
                debug!("Instantiating backend {}", name);
                (registered.factory)(url)
            })
            .cloned()
    }
}
