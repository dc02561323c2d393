// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

use crate::utils::errors::ErrorKind;

/// 注册指标描述
///
/// 只登记描述，不安装导出器；由宿主程序选择 recorder
pub fn describe_metrics() {
    describe_counter!(
        "crawl_requests_total",
        "Total number of crawl requests dispatched to a backend"
    );
    describe_counter!(
        "crawl_cache_hits_total",
        "Total number of crawl requests served from cache"
    );
    describe_counter!(
        "crawl_failures_total",
        "Total number of crawl requests that failed, by error kind"
    );
    describe_histogram!(
        "crawl_duration_seconds",
        "Duration of backend crawls in seconds"
    );
}

pub fn record_request(backend: &str) {
    counter!("crawl_requests_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_cache_hit(backend: &str) {
    counter!("crawl_cache_hits_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_failure(backend: &str, kind: ErrorKind) {
    counter!(
        "crawl_failures_total",
        "backend" => backend.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_duration(backend: &str, elapsed: Duration) {
    histogram!("crawl_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}
