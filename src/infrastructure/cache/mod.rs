// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 爬取结果的缓存层，包括内存与Redis两种策略以及吸收存储故障的缓存管理器
pub mod cache_manager;
pub mod cache_strategy;
pub mod redis_client;
