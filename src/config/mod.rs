// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 进程级设置（settings）以及每次爬取显式传入的爬取配置（crawl_config）
pub mod crawl_config;
pub mod settings;
