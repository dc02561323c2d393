// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    config, html_page, local_dispatcher, local_dispatcher_with_cache, MockBackend, MockRenderer,
    WriteFailingStrategy,
};
use async_trait::async_trait;
use crawlstudio::config::crawl_config::{CrawlConfig, CrawlConfigInput};
use crawlstudio::config::settings::Settings;
use crawlstudio::domain::models::crawl_result::{normalize, CrawlResult, OutputFormat, RawEngineOutput};
use crawlstudio::engines::dispatcher::CrawlDispatcher;
use crawlstudio::engines::registry::BackendRegistry;
use crawlstudio::engines::traits::{BackendDescriptor, BackendVariant, CrawlBackend, EngineError};
use crawlstudio::infrastructure::cache::cache_manager::CacheManager;
use crawlstudio::utils::errors::{CrawlError, ErrorKind};
use mockall::Sequence;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_URL: &str = "https://example.com/page";

fn article() -> &'static str {
    r#"<html><head><title>Article</title></head><body><h1>Heading</h1><p>Body text.</p></body></html>"#
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_backend_runs() {
    let input = CrawlConfigInput {
        format: "pdf".to_string(),
        ..Default::default()
    };
    let err = CrawlConfig::validate(input).unwrap_err();
    assert_eq!(err.field, "format");

    let input = CrawlConfigInput {
        timeout: 0.0,
        ..Default::default()
    };
    assert_eq!(CrawlConfig::validate(input).unwrap_err().field, "timeout");

    let input = CrawlConfigInput {
        cache_ttl: -1,
        ..Default::default()
    };
    assert_eq!(CrawlConfig::validate(input).unwrap_err().field, "cache_ttl");
}

#[tokio::test]
async fn test_invalid_url_is_a_validation_error() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(0);
    let dispatcher = local_dispatcher(renderer);

    for url in ["", "not a url", "ftp://example.com/file", "/relative/path"] {
        let err = dispatcher
            .dispatch(url, &config(OutputFormat::Markdown), "local-rendering")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "url {:?}", url);
    }
}

#[tokio::test]
async fn test_result_populates_only_requested_field() {
    for format in OutputFormat::ALL {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .returning(|url, _| Ok(html_page(url, article())));
        let dispatcher = local_dispatcher(renderer);

        let result = dispatcher
            .dispatch(PAGE_URL, &config(format), "local-rendering")
            .await
            .unwrap();

        assert_eq!(result.format(), Some(format));
        let populated = [
            result.markdown().is_some(),
            result.raw_html().is_some(),
            result.structured_data().is_some(),
        ];
        assert_eq!(populated.iter().filter(|p| **p).count(), 1);
        assert_eq!(result.backend_name(), "local-rendering");
        assert!(!result.cache_hit());
        assert_eq!(result.title(), Some("Article"));
    }
}

#[tokio::test]
async fn test_cold_then_warm_cache_invokes_backend_once() {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(1)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher(renderer);
    let config = CrawlConfig::builder()
        .format(OutputFormat::Markdown)
        .cache_enabled(true)
        .cache_ttl_secs(300)
        .build()
        .unwrap();

    let cold = dispatcher
        .dispatch("https://example.com", &config, "local-rendering")
        .await
        .unwrap();
    let warm = dispatcher
        .dispatch("https://example.com", &config, "local-rendering")
        .await
        .unwrap();

    assert!(!cold.cache_hit());
    assert!(warm.cache_hit());
    assert_eq!(warm.clone().with_cache_hit(false), cold);

    let stats = dispatcher.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.stores, 1);
}

#[tokio::test]
async fn test_cache_is_keyed_by_format() {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(2)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher(renderer);

    let markdown = dispatcher
        .dispatch(PAGE_URL, &config(OutputFormat::Markdown), "local-rendering")
        .await
        .unwrap();
    let html = dispatcher
        .dispatch(PAGE_URL, &config(OutputFormat::Html), "local-rendering")
        .await
        .unwrap();

    assert!(!markdown.cache_hit());
    assert!(!html.cache_hit());
    assert!(html.raw_html().is_some());
}

#[tokio::test]
async fn test_disabled_cache_always_reaches_backend() {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(2)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher(renderer);
    let config = CrawlConfig::builder().cache_enabled(false).build().unwrap();

    for _ in 0..2 {
        let result = dispatcher
            .dispatch(PAGE_URL, &config, "local-rendering")
            .await
            .unwrap();
        assert!(!result.cache_hit());
    }
    assert_eq!(dispatcher.cache().stats().stores, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cached_entry_expires_after_ttl() {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(2)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher(renderer);
    let config = CrawlConfig::builder().cache_ttl_secs(60).build().unwrap();

    let first = dispatcher
        .dispatch(PAGE_URL, &config, "local-rendering")
        .await
        .unwrap();
    assert!(!first.cache_hit());

    tokio::time::advance(Duration::from_secs(30)).await;
    let within_ttl = dispatcher
        .dispatch(PAGE_URL, &config, "local-rendering")
        .await
        .unwrap();
    assert!(within_ttl.cache_hit());

    tokio::time::advance(Duration::from_secs(31)).await;
    let expired = dispatcher
        .dispatch(PAGE_URL, &config, "local-rendering")
        .await
        .unwrap();
    assert!(!expired.cache_hit());
}

#[tokio::test]
async fn test_unknown_backend_is_rejected() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(0);
    let dispatcher = local_dispatcher(renderer);

    for name in ["scrapy", "Local-Rendering", ""] {
        let err = dispatcher
            .dispatch(PAGE_URL, &config(OutputFormat::Markdown), name)
            .await
            .unwrap_err();
        assert_eq!(err.url(), Some(PAGE_URL));
        match err {
            CrawlError::UnknownBackend { backend, url } => {
                assert_eq!(backend, name);
                assert_eq!(url, PAGE_URL);
            }
            other => panic!("expected UnknownBackend, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_backend_wins_over_malformed_url() {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(0);
    let dispatcher = local_dispatcher(renderer);

    for url in ["not a url", "", "ftp://example.com/file"] {
        for format in OutputFormat::ALL {
            let err = dispatcher
                .dispatch(url, &config(format), "scrapy")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownBackend, "url {:?}", url);
            assert_eq!(err.backend_name(), Some("scrapy"));
        }
    }
}

#[tokio::test]
async fn test_unsupported_format_never_invokes_backend() {
    let descriptor = BackendDescriptor::new(
        "html-only",
        &[OutputFormat::Html, OutputFormat::Structured],
        BackendVariant::StructuralExtraction,
    );
    let mut backend = MockBackend::new();
    backend.expect_descriptor().return_const(descriptor);
    backend.expect_crawl().times(0);

    let mut registry = BackendRegistry::new();
    registry.register_instance(Arc::new(backend));
    let dispatcher = CrawlDispatcher::new(registry, CacheManager::in_memory(10));

    let err = dispatcher
        .dispatch(PAGE_URL, &config(OutputFormat::Markdown), "html-only")
        .await
        .unwrap_err();

    match err {
        CrawlError::UnsupportedFormat {
            backend,
            url,
            format,
        } => {
            assert_eq!(backend, "html-only");
            assert_eq!(url, PAGE_URL);
            assert_eq!(format, OutputFormat::Markdown);
        }
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }

    let err = dispatcher
        .dispatch("not a url", &config(OutputFormat::Markdown), "html-only")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

#[tokio::test]
async fn test_engine_failure_is_attributed_to_backend_and_url() {
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(1)
        .returning(|_, _| Err(EngineError::Other("connection reset by peer".to_string())));
    let dispatcher = local_dispatcher(renderer);

    let err = dispatcher
        .dispatch("https://example.com", &config(OutputFormat::Markdown), "local-rendering")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Engine);
    assert_eq!(err.backend_name(), Some("local-rendering"));
    assert_eq!(err.url(), Some("https://example.com"));
    assert!(err.to_string().contains("connection reset by peer"));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let mut renderer = MockRenderer::new();
    let mut seq = Sequence::new();
    renderer
        .expect_render()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(EngineError::Other("flaky upstream".to_string())));
    renderer
        .expect_render()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher(renderer);
    let config = config(OutputFormat::Markdown);

    assert!(dispatcher
        .dispatch(PAGE_URL, &config, "local-rendering")
        .await
        .is_err());

    let retried = dispatcher
        .dispatch(PAGE_URL, &config, "local-rendering")
        .await
        .unwrap();
    assert!(!retried.cache_hit());
    assert!(retried.markdown().unwrap().contains("Heading"));
}

#[tokio::test]
async fn test_cache_write_failure_does_not_change_outcome() {
    let strategy = Arc::new(WriteFailingStrategy::new());
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(2)
        .returning(|url, _| Ok(html_page(url, article())));
    let dispatcher = local_dispatcher_with_cache(renderer, CacheManager::new(strategy.clone()));
    let config = config(OutputFormat::Markdown);

    for _ in 0..2 {
        let result = dispatcher
            .dispatch(PAGE_URL, &config, "local-rendering")
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(!result.cache_hit());
    }

    assert_eq!(strategy.failed_writes(), 2);
    assert_eq!(dispatcher.cache().stats().errors, 2);
}

/// 永远不返回的后端
struct StalledBackend {
    descriptor: BackendDescriptor,
}

#[async_trait]
impl CrawlBackend for StalledBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn crawl(
        &self,
        _url: &str,
        _format: OutputFormat,
        _config: &CrawlConfig,
    ) -> Result<CrawlResult, CrawlError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_enforces_timeout() {
    let mut registry = BackendRegistry::new();
    registry.register_instance(Arc::new(StalledBackend {
        descriptor: BackendDescriptor::new("stalled", &OutputFormat::ALL, BackendVariant::LocalRendering),
    }));
    let dispatcher = CrawlDispatcher::new(registry, CacheManager::in_memory(10));
    let config = CrawlConfig::builder().timeout_secs(2.0).build().unwrap();

    let err = dispatcher
        .dispatch(PAGE_URL, &config, "stalled")
        .await
        .unwrap_err();

    match err {
        CrawlError::Timeout {
            backend,
            url,
            timeout_secs,
        } => {
            assert_eq!(backend, "stalled");
            assert_eq!(url, PAGE_URL);
            assert_eq!(timeout_secs, 2.0);
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mock_backend_result_passes_through() {
    let descriptor = BackendDescriptor::new("canned", &OutputFormat::ALL, BackendVariant::ProductionApi);
    let mut backend = MockBackend::new();
    backend.expect_descriptor().return_const(descriptor);
    backend
        .expect_crawl()
        .times(1)
        .returning(|url, format, _| {
            Ok(normalize(
                RawEngineOutput::new(url)
                    .with_markdown("# Canned")
                    .with_meta("title", "Canned"),
                format,
                "canned",
                7,
            ))
        });

    let mut registry = BackendRegistry::new();
    registry.register_instance(Arc::new(backend));
    let dispatcher = CrawlDispatcher::new(registry, CacheManager::in_memory(10));

    let result = dispatcher
        .dispatch(PAGE_URL, &config(OutputFormat::Markdown), "canned")
        .await
        .unwrap();

    assert_eq!(result.markdown(), Some("# Canned"));
    assert_eq!(result.title(), Some("Canned"));
    assert_eq!(result.timing_ms(), 7);
}

#[tokio::test]
async fn test_default_registry_serves_selector_backend_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Products</title></head><body>
                <span class="price">$10</span><span class="price">$12</span>
                <a href="/products/1">One</a>
            </body></html>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = Arc::new(Settings::new().unwrap());
    let dispatcher = CrawlDispatcher::from_settings(settings).await;
    assert_eq!(
        dispatcher.registry().names(),
        vec!["browser-agent", "firecrawl", "local-rendering", "selector"]
    );

    let config = CrawlConfig::builder()
        .format(OutputFormat::Structured)
        .backend_option(
            "selectors",
            json!({ "prices": { "selector": ".price", "is_array": true } }),
        )
        .build()
        .unwrap();
    let url = format!("{}/products", server.uri());

    let first = dispatcher.dispatch(&url, &config, "selector").await.unwrap();
    let data = first.structured_data().unwrap();
    assert_eq!(data["title"], "Products");
    assert_eq!(data["prices"], json!(["$10", "$12"]));

    let second = dispatcher.dispatch(&url, &config, "selector").await.unwrap();
    assert!(second.cache_hit());
}

#[tokio::test]
async fn test_default_registry_serves_firecrawl_backend_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("authorization", "Bearer fc-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "markdown": "# Hosted",
                "metadata": { "title": "Hosted", "statusCode": 200, "sourceURL": PAGE_URL }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = Settings::new().unwrap();
    settings.firecrawl.base_url = server.uri();
    let dispatcher = CrawlDispatcher::from_settings(Arc::new(settings)).await;
    let config = CrawlConfig::builder().api_key("fc-test").build().unwrap();

    let result = dispatcher.dispatch(PAGE_URL, &config, "firecrawl").await.unwrap();
    assert_eq!(result.markdown(), Some("# Hosted"));
    assert_eq!(result.title(), Some("Hosted"));
    assert_eq!(result.backend_name(), "firecrawl");
}
