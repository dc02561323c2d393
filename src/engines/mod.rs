// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 引擎模块
///
/// 后端能力接口、四种后端实现、后端注册表与分发器
pub mod browser_agent_engine;
pub mod browser_session;
pub mod dispatcher;
pub mod firecrawl_engine;
pub mod local_render_engine;
pub mod registry;
pub mod selector_engine;
pub mod traits;
