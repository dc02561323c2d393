// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::engines::traits::{within_timeout, EngineError};

/// 浏览器渲染后的页面
#[derive(Debug, Clone, PartialEq)]
pub struct BrowsedPage {
    pub final_url: String,
    pub title: Option<String>,
    pub html: String,
}

/// 浏览器会话协作者
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 打开页面并返回渲染后的内容
    async fn open(&self, url: &str, timeout: Duration) -> Result<BrowsedPage, EngineError>;
}

/// 基于 chromiumoxide 的浏览器会话
///
/// 浏览器在第一次使用时启动（或连接远程实例），之后在同一会话内复用
pub struct ChromiumSession {
    remote_debugging_url: Option<String>,
    browser: OnceCell<Browser>,
}

impl ChromiumSession {
    pub fn new(remote_debugging_url: Option<String>) -> Self {
        Self {
            remote_debugging_url,
            browser: OnceCell::new(),
        }
    }

    async fn browser(&self) -> Result<&Browser, EngineError> {
        self.browser
            .get_or_try_init(|| async {
                let (browser, mut handler) = if let Some(ref url) = self.remote_debugging_url {
                    tracing::info!("Connecting to remote Chrome instance at: {}", url);
                    Browser::connect(url.as_str()).await.map_err(|e| {
                        EngineError::Browser(format!("Failed to connect to remote Chrome: {}", e))
                    })?
                } else {
                    let config = BrowserConfig::builder()
                        .no_sandbox()
                        .request_timeout(Duration::from_secs(30))
                        .arg("--disable-gpu")
                        .arg("--disable-dev-shm-usage")
                        .build()
                        .map_err(EngineError::Browser)?;

                    Browser::launch(config)
                        .await
                        .map_err(|e| EngineError::Browser(e.to_string()))?
                };

                // 浏览器事件必须持续被消费
                tokio::spawn(async move {
                    while let Some(h) = handler.next().await {
                        if h.is_err() {
                            break;
                        }
                    }
                });

                Ok(browser)
            })
            .await
    }
}

/// 可关闭的浏览器标签页
#[async_trait]
trait Tab: Send + 'static {
    async fn close_tab(self) -> Result<(), EngineError>;
}

#[async_trait]
impl Tab for Page {
    async fn close_tab(self) -> Result<(), EngineError> {
        self.close()
            .await
            .map_err(|e| EngineError::Browser(e.to_string()))
    }
}

/// 标签页守卫
///
/// 正常路径上显式关闭；出错提前返回或被超时取消时，在 Drop 中交给运行时后台关闭，
/// 保证共享浏览器里不会残留标签页
struct TabGuard<T: Tab> {
    tab: Option<T>,
    url: String,
}

impl<T: Tab> TabGuard<T> {
    fn new(tab: T, url: &str) -> Self {
        Self {
            tab: Some(tab),
            url: url.to_string(),
        }
    }

    async fn close(mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close_tab().await {
                debug!("Failed to close page for {}: {}", self.url, e);
            }
        }
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        let Some(tab) = self.tab.take() else {
            return;
        };
        let url = std::mem::take(&mut self.url);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = tab.close_tab().await {
                        debug!("Failed to close abandoned page for {}: {}", url, e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to close page for {}", url),
        }
    }
}

async fn read_page(page: &Page, url: &str) -> Result<BrowsedPage, EngineError> {
    page.goto(url)
        .await
        .map_err(|e| EngineError::Browser(e.to_string()))?;

    let html = page
        .content()
        .await
        .map_err(|e| EngineError::Browser(e.to_string()))?;
    let title = page.get_title().await.ok().flatten();
    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());

    Ok(BrowsedPage {
        final_url,
        title,
        html,
    })
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&self, url: &str, timeout: Duration) -> Result<BrowsedPage, EngineError> {
        within_timeout(timeout, async {
            let browser = self.browser().await?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| EngineError::Browser(e.to_string()))?;
            let tab = TabGuard::new(page.clone(), url);

            let outcome = read_page(&page, url).await;
            tab.close().await;
            outcome
        })
        .await
    }
}
