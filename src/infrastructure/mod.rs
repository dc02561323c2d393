// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 包含的子模块：
/// - 缓存（cache）：爬取结果缓存，内存与Redis两种策略
/// - 指标（metrics）：请求、缓存命中、失败与耗时指标
pub mod cache;
pub mod metrics;
