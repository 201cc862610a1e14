//! 浏览器服务
//!
//! 基于 chromiumoxide 封装单页浏览器会话：启动、导航、元素查询与确定性释放。
//! 采用显式的所有权管理，确保关闭逻辑不依赖非确定性的析构时机。

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::{
    Browser, Element, Page,
    browser::BrowserConfig as ChromeConfig,
    error::CdpError,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::config::BrowserConfig;
use crate::core::error::{CrawlError, Result};
use crate::core::model::{DomQuery, ImageAttrs, Selector, Strategy};
use crate::interfaces::{PageDriver, SessionProvider};

fn session_err(err: impl std::fmt::Display) -> CrawlError {
    CrawlError::Session(err.to_string())
}

/// 传输层故障：浏览器进程或 CDP 通道已不可用。
/// 其余查询错误（元素不存在、协议级报错）折算为"缺席"。
fn is_transport_fault(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

/// 浏览器会话
///
/// 一个会话独占一个浏览器进程和一个页面标签；
/// 引擎在致命故障或页数阈值触发时丢弃整个会话重建。
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    user_agent: String,
}

impl BrowserSession {
    /// 启动浏览器会话并探测原生 User-Agent
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let chrome_config = build_chrome_config(config)?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(session_err)?;

        // 启动事件循环
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(session_err)?;

        let user_agent = match page.evaluate("navigator.userAgent").await {
            Ok(value) => value
                .into_value::<String>()
                .map(|ua| ua.replace("HeadlessChrome", "Chrome"))
                .unwrap_or_else(|_| fallback_ua()),
            Err(_) => fallback_ua(),
        };
        debug!("会话 UA: {}", user_agent);

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
            page: Some(page),
            user_agent,
        })
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| CrawlError::Session("session already disposed".into()))
    }

    async fn find_one(&self, query: &DomQuery) -> Result<Option<Element>> {
        let page = self.page()?;
        let found = match query {
            DomQuery::Css(css) => page.find_element(css.clone()).await,
            DomQuery::XPath(xpath) => page.find_xpath(xpath.clone()).await,
        };
        match found {
            Ok(element) => Ok(Some(element)),
            Err(e) if is_transport_fault(&e) => Err(session_err(e)),
            Err(_) => Ok(None),
        }
    }

    async fn find_all(&self, query: &DomQuery) -> Result<Vec<Element>> {
        let page = self.page()?;
        let found = match query {
            DomQuery::Css(css) => page.find_elements(css.clone()).await,
            DomQuery::XPath(xpath) => page.find_xpaths(xpath.clone()).await,
        };
        match found {
            Ok(elements) => Ok(elements),
            Err(e) if is_transport_fault(&e) => Err(session_err(e)),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn attribute_of(&self, element: &Element, name: &str) -> Result<Option<String>> {
        match element.attribute(name).await {
            Ok(value) => Ok(value),
            Err(e) if is_transport_fault(&e) => Err(session_err(e)),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page()?;

        // 先导航到空白页，促使上一页资源释放；失败忽略
        let _ = page.goto("about:blank").await;

        page.goto(url).await.map_err(session_err)?;
        let _ = page.wait_for_navigation().await;

        // 滚动到底部，让懒加载内容进入可查询状态
        page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(session_err)?;
        Ok(())
    }

    async fn settle(&self, delay: std::time::Duration) {
        tokio::time::sleep(delay).await;
    }

    async fn origin(&self) -> Result<String> {
        let page = self.page()?;
        page.evaluate("window.location.origin")
            .await
            .map_err(session_err)?
            .into_value::<String>()
            .map_err(session_err)
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn query_text(&self, selector: &Selector) -> Result<Option<String>> {
        // XPath 携带属性后缀时直接取属性值
        if selector.strategy == Strategy::XPath
            && let Some(attr) = &selector.attribute
        {
            let Some(element) = self.find_one(&selector.to_query()).await? else {
                return Ok(None);
            };
            return Ok(self
                .attribute_of(&element, attr)
                .await?
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()));
        }

        let Some(element) = self.find_one(&selector.to_query()).await? else {
            return Ok(None);
        };
        match element.inner_text().await {
            Ok(text) => Ok(text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())),
            Err(e) if is_transport_fault(&e) => Err(session_err(e)),
            Err(_) => Ok(None),
        }
    }

    async fn query_attribute(
        &self,
        selector: &Selector,
        attribute: &str,
    ) -> Result<Option<String>> {
        let Some(element) = self.find_one(&selector.to_query()).await? else {
            return Ok(None);
        };
        self.attribute_of(&element, attribute).await
    }

    async fn query_image_candidates(&self, selector: &Selector) -> Result<Vec<ImageAttrs>> {
        let elements = self.find_all(&selector.to_query()).await?;

        let mut bags = Vec::with_capacity(elements.len());
        for element in &elements {
            bags.push(ImageAttrs {
                src: self.attribute_of(element, "src").await?,
                srcset: self.attribute_of(element, "srcset").await?,
                width: self.attribute_of(element, "width").await?,
                data_orig_file: self.attribute_of(element, "data-orig-file").await?,
                data_image: self.attribute_of(element, "data-image").await?,
            });
        }
        Ok(bags)
    }

    /// 幂等释放：关闭浏览器并等待事件循环结束；重复调用为空操作
    async fn dispose(&mut self) {
        self.page = None;
        let browser = self.browser.take();
        let handler = self.handler.take();

        if let Some(mut b) = browser {
            let _ = b.close().await;
            if let Some(h) = handler {
                let _ = h.await;
            }
        }
    }
}

// 在 Drop 时尝试最后一次保护，避免泄漏浏览器进程
impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            // 在后台清理
            tokio::spawn(async move {
                let _ = browser.close().await;
                if let Some(h) = handler {
                    let _ = h.await;
                }
            });
        }
    }
}

fn fallback_ua() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

/// 构建浏览器启动配置
fn build_chrome_config(config: &BrowserConfig) -> Result<ChromeConfig> {
    let mut builder = ChromeConfig::builder()
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-sandbox")
        .arg("--window-size=1920,1080")
        .arg("--disable-extensions");

    if config.headless {
        builder = builder.arg("--headless=new");
    } else {
        builder = builder.with_head();
    }

    let chrome_path = if let Some(path) = &config.chrome_path {
        Some(path.clone())
    } else {
        [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        ]
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
    };

    if let Some(path) = chrome_path {
        builder = builder.chrome_executable(path);
    }

    builder.build().map_err(CrawlError::Session)
}

// =============================================================================
// BrowserService
// =============================================================================

/// 会话工厂：引擎每次重建会话都会经由这里拿到全新实例
pub struct BrowserService {
    config: BrowserConfig,
}

impl BrowserService {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionProvider for BrowserService {
    type Session = BrowserSession;

    async fn open(&self) -> Result<BrowserSession> {
        BrowserSession::launch(&self.config).await
    }
}
