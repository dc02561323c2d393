// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：归一化的爬取结果与输出格式
/// - 服务（services）：批量与递归爬取、选择器提取、语言模型调用
pub mod models;
pub mod services;
