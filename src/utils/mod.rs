// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
/// 包括错误类型、URL处理、内容提取、遥测等
pub mod content_extraction;
pub mod errors;
pub mod telemetry;
pub mod url_utils;
