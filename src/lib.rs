// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 进程级设置与每次爬取的已校验配置
pub mod config;

/// 领域模块
///
/// 包含爬取结果模型和领域服务
pub mod domain;

/// 引擎模块
///
/// 实现各种爬取后端以及统一的分发入口
pub mod engines;

/// 基础设施模块
///
/// 提供缓存与指标等外部服务集成
pub mod infrastructure;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

pub use config::crawl_config::{CrawlConfig, CrawlConfigInput};
pub use config::settings::Settings;
pub use domain::models::crawl_result::{CrawlResult, OutputFormat};
pub use engines::dispatcher::CrawlDispatcher;
pub use engines::registry::BackendRegistry;
pub use engines::traits::{BackendDescriptor, CrawlBackend};
pub use utils::errors::{CrawlError, ValidationError};
