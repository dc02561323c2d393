// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{config, html_page, local_dispatcher, site_page, MockRenderer};
use crawlstudio::domain::models::crawl_result::OutputFormat;
use crawlstudio::domain::services::crawl_service::{CrawlLimits, CrawlService};
use crawlstudio::engines::traits::EngineError;
use crawlstudio::utils::errors::{CrawlError, ErrorKind};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

const START: &str = "https://example.com/";

fn site_service() -> CrawlService {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .returning(|url, _| Ok(site_page(url)));
    CrawlService::new(Arc::new(local_dispatcher(renderer)))
}

#[tokio::test]
async fn test_batch_preserves_input_order_and_records_failures() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(3).returning(|url, _| {
        if url.contains("broken") {
            Err(EngineError::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream exploded",
            ))
        } else {
            Ok(html_page(url, "<html><body><p>ok</p></body></html>"))
        }
    });
    let service = CrawlService::new(Arc::new(local_dispatcher(renderer)));

    let urls = [
        "https://example.com/one",
        "https://example.com/broken",
        "https://example.com/three",
    ];
    let results = service
        .crawl_batch(&urls, &config(OutputFormat::Html), "local-rendering", 2)
        .await;

    assert_eq!(results.len(), 3);
    for (result, url) in results.iter().zip(urls) {
        assert_eq!(result.url(), url);
        assert_eq!(result.backend_name(), "local-rendering");
    }
    assert!(results[0].is_success());
    assert!(results[2].is_success());

    let failed = &results[1];
    assert_eq!(failed.format(), None);
    let error = failed.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Engine);
    assert!(error.message.contains("upstream exploded"));
}

#[tokio::test]
async fn test_batch_with_unknown_backend_reports_every_url() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(0);
    let service = CrawlService::new(Arc::new(local_dispatcher(renderer)));

    let urls = vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()];
    let results = service
        .crawl_batch(&urls[..], &config(OutputFormat::Markdown), "nope", 0)
        .await;

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.error().map(|e| e.kind) == Some(ErrorKind::UnknownBackend)));
}

#[tokio::test]
async fn test_recursive_crawl_honors_depth_and_level_limits() {
    let service = site_service();
    let limits = CrawlLimits {
        max_depth: 1,
        max_pages_per_level: 2,
        ..Default::default()
    };

    let report = service
        .crawl_recursive(START, &config(OutputFormat::Html), "local-rendering", &limits)
        .await
        .unwrap();

    assert_eq!(report.start_url, START);
    assert_eq!(report.pages.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.max_depth_reached(), 1);

    let breakdown = report.depth_breakdown();
    assert_eq!(breakdown.get(&0), Some(&1));
    assert_eq!(breakdown.get(&1), Some(&2));

    let urls: Vec<&str> = report.pages.iter().map(|p| p.result.url()).collect();
    assert_eq!(
        urls,
        vec![START, "https://example.com/a", "https://example.com/b"]
    );
}

#[tokio::test]
async fn test_recursive_crawl_stays_on_start_host_and_never_revisits() {
    let service = site_service();
    let limits = CrawlLimits {
        max_depth: 3,
        ..Default::default()
    };

    let report = service
        .crawl_recursive(START, &config(OutputFormat::Html), "local-rendering", &limits)
        .await
        .unwrap();

    let urls: Vec<&str> = report.pages.iter().map(|p| p.result.url()).collect();
    assert_eq!(
        urls,
        vec![
            START,
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c",
        ]
    );
    assert!(urls.iter().all(|u| !u.contains("other.org")));
    assert_eq!(report.max_depth_reached(), 1);
}

#[tokio::test]
async fn test_recursive_crawl_stops_at_page_budget() {
    let service = site_service();
    let limits = CrawlLimits {
        max_depth: 3,
        max_pages: 2,
        ..Default::default()
    };

    let report = service
        .crawl_recursive(START, &config(OutputFormat::Html), "local-rendering", &limits)
        .await
        .unwrap();

    assert_eq!(report.total_attempted(), 2);
}

#[tokio::test]
async fn test_recursive_crawl_follows_markdown_links() {
    let service = site_service();
    let limits = CrawlLimits {
        max_depth: 1,
        include_patterns: vec!["/c".to_string()],
        ..Default::default()
    };

    let report = service
        .crawl_recursive(START, &config(OutputFormat::Markdown), "local-rendering", &limits)
        .await
        .unwrap();

    let urls: Vec<&str> = report.pages.iter().map(|p| p.result.url()).collect();
    assert_eq!(urls, vec![START, "https://example.com/c"]);
}

#[tokio::test]
async fn test_recursive_crawl_records_page_failures_and_continues() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().returning(|url, _| {
        if url.ends_with("/b") {
            Err(EngineError::Other("connection reset".to_string()))
        } else {
            Ok(site_page(url))
        }
    });
    let service = CrawlService::new(Arc::new(local_dispatcher(renderer)));
    let limits = CrawlLimits {
        max_depth: 1,
        ..Default::default()
    };

    let report = service
        .crawl_recursive(START, &config(OutputFormat::Html), "local-rendering", &limits)
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.depth, 1);
    assert_eq!(failure.url, "https://example.com/b");
    assert_eq!(failure.kind, ErrorKind::Engine);
}

#[tokio::test]
async fn test_recursive_crawl_aborts_on_unknown_backend() {
    let service = site_service();

    let err = service
        .crawl_recursive(START, &config(OutputFormat::Html), "missing", &CrawlLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::UnknownBackend { .. }));
}

#[tokio::test]
async fn test_recursive_crawl_rejects_invalid_start_url() {
    let service = site_service();

    let err = service
        .crawl_recursive("example.com", &config(OutputFormat::Html), "local-rendering", &CrawlLimits::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn test_recursive_crawl_waits_between_requests() {
    let service = site_service();
    let limits = CrawlLimits {
        max_depth: 1,
        max_pages_per_level: 2,
        delay: Duration::from_secs(1),
        ..Default::default()
    };

    let started = tokio::time::Instant::now();
    let report = service
        .crawl_recursive(START, &config(OutputFormat::Html), "local-rendering", &limits)
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(2));
}
