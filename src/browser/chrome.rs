//! Chromium backend over the DevTools protocol.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Browser, ElementHandle, ElementSnapshot, LoadedPage, Query, Scope};
use crate::error::BrowserError;

/// Captures element state in one round trip.
const SNAPSHOT_JS: &str = r#"function() {
    const style = window.getComputedStyle(this);
    const visible = style.visibility !== 'hidden'
        && style.display !== 'none'
        && this.getClientRects().length > 0;
    const attrs = {};
    for (const a of this.attributes) { attrs[a.name] = a.value; }
    if (this.href) { attrs['href'] = String(this.href); }
    return JSON.stringify({
        tag: this.tagName.toLowerCase(),
        text: this.innerText || this.textContent || '',
        visible: visible,
        attrs: attrs
    });
}"#;

#[derive(Deserialize)]
struct RawSnapshot {
    tag: String,
    text: String,
    visible: bool,
    attrs: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub request_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: std::env::var_os("CHROME_BIN").map(PathBuf::from),
            window_size: (1920, 1080),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A single Chromium tab driven over CDP.
pub struct ChromeBrowser {
    browser: CdpBrowser,
    handler: tokio::task::JoinHandle<()>,
    page: Page,
    elements: Vec<Element>,
    generation: u64,
}

impl ChromeBrowser {
    pub async fn launch(options: &ChromeOptions) -> Result<Self, BrowserError> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .request_timeout(options.request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--mute-audio");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must keep polling.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            browser,
            handler,
            page,
            elements: Vec::new(),
            generation: 0,
        })
    }

    fn element(&self, snapshot: &ElementSnapshot) -> Result<&Element, BrowserError> {
        if snapshot.handle.generation != self.generation {
            return Err(BrowserError::Detached);
        }
        self.elements
            .get(snapshot.handle.index)
            .ok_or(BrowserError::Detached)
    }

    /// Any interaction may navigate, so handles from before it are stale.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.elements.clear();
    }

    async fn snapshot(&self, element: &Element, index: usize) -> Result<ElementSnapshot, BrowserError> {
        let returns = element
            .call_js_fn(SNAPSHOT_JS, false)
            .await
            .map_err(|e| query_error("snapshot", e))?;
        let json = returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or(BrowserError::Detached)?;
        let raw: RawSnapshot =
            serde_json::from_str(&json).map_err(|e| query_error("snapshot", e))?;

        Ok(ElementSnapshot {
            handle: ElementHandle {
                generation: self.generation,
                index,
            },
            tag: raw.tag,
            text: raw.text,
            attributes: raw.attrs,
            visible: raw.visible,
        })
    }
}

fn query_error(query: impl ToString, e: impl ToString) -> BrowserError {
    BrowserError::Query {
        query: query.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn goto(&mut self, url: &str) -> Result<LoadedPage, BrowserError> {
        self.invalidate();
        let load_error = |e: chromiumoxide::error::CdpError| BrowserError::Load {
            url: url.to_string(),
            message: e.to_string(),
        };
        self.page.goto(url).await.map_err(load_error)?;
        self.page.wait_for_navigation().await.map_err(load_error)?;

        let final_url = self
            .page
            .url()
            .await
            .map_err(load_error)?
            .unwrap_or_else(|| url.to_string());
        let title = self.page.get_title().await.map_err(load_error)?.unwrap_or_default();
        Ok(LoadedPage {
            url: final_url,
            title,
        })
    }

    async fn find(
        &mut self,
        query: &Query,
        scope: Scope<'_>,
    ) -> Result<Vec<ElementSnapshot>, BrowserError> {
        let found = match (query, scope) {
            (Query::Css(css), Scope::Document) => self.page.find_elements(css.as_str()).await,
            (Query::Css(css), Scope::Within(parent)) => {
                self.element(parent)?.find_elements(css.as_str()).await
            }
            (_, Scope::Document) => {
                let xpath = query.to_xpath().ok_or_else(|| query_error(query, "no xpath"))?;
                self.page.find_xpaths(xpath).await
            }
            (_, Scope::Within(_)) => {
                return Err(BrowserError::Unsupported("scoped label queries"));
            }
        };
        // No match is not an error for callers.
        let found = match found {
            Ok(found) => found,
            Err(e) => {
                debug!("Query {} found nothing: {}", query, e);
                Vec::new()
            }
        };

        let mut snapshots = Vec::with_capacity(found.len());
        for element in found {
            let index = self.elements.len();
            match self.snapshot(&element, index).await {
                Ok(snapshot) => {
                    self.elements.push(element);
                    snapshots.push(snapshot);
                }
                Err(e) => warn!("Skipping element for {}: {}", query, e),
            }
        }
        Ok(snapshots)
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), BrowserError> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| BrowserError::Click(e.to_string()))?;
        self.invalidate();
        Ok(())
    }

    async fn js_click(&mut self, element: &ElementSnapshot) -> Result<(), BrowserError> {
        self.element(element)?
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| BrowserError::Click(e.to_string()))?;
        self.invalidate();
        Ok(())
    }

    async fn body_text(&mut self) -> Result<String, BrowserError> {
        let result = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| query_error("body", e))?;
        result.into_value::<String>().map_err(|e| query_error("body", e))
    }

    async fn title(&mut self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| query_error("title", e))?
            .unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| query_error("url", e))?
            .unwrap_or_default())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|e| query_error("screenshot", e))?;
        Ok(())
    }

    fn screenshot_extension(&self) -> &'static str {
        "png"
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let result = self.browser.close().await;
        self.handler.abort();
        result.map(|_| ()).map_err(|e| BrowserError::Launch(e.to_string()))
    }
}
