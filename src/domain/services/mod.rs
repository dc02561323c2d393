// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 爬取服务（crawl_service）：批量爬取与按深度限制的递归爬取
/// - 提取服务（extraction_service）：基于CSS选择器的结构化提取
/// - LLM服务（llm_service）：OpenAI 兼容的语言模型调用
pub mod crawl_service;
pub mod extraction_service;
pub mod llm_service;
