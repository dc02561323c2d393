// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 安装全局 tracing 订阅者
///
/// 日志级别取自 `RUST_LOG`，未设置时为 `info,crawlstudio=debug`。
/// 重复调用时保留已有的订阅者，返回 false。
pub fn init_telemetry() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawlstudio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
