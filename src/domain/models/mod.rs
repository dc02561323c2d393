// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 爬取结果（crawl_result）：所有后端共享的结果契约及归一化操作
pub mod crawl_result;
