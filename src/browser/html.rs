//! Static-HTML browser backend.
//!
//! Evaluates queries with the `scraper` crate against documents supplied by
//! a [`PageSource`]. There is no script execution: clicking an element
//! follows its `href` or `data-href`, which is how server-rendered directory
//! listings expose their filter and pagination controls.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::text::{is_visible, own_text, rendered_text};
use super::{Browser, ElementHandle, ElementSnapshot, LoadedPage, Query, Scope};
use crate::error::BrowserError;

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: Url,
    pub html: String,
}

/// Supplies HTML documents for [`HtmlBrowser`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, BrowserError>;
}

/// Fetches pages over HTTP with `reqwest`.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, BrowserError> {
        let load_error = |message: String| BrowserError::Load {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| load_error(e.to_string()))?;

        // Server errors are worth retrying; 4xx pages render like a browser would.
        let status = response.status();
        if status.is_server_error() {
            return Err(load_error(format!("HTTP {}", status)));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| load_error(e.to_string()))?;

        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}

struct CurrentPage {
    url: Url,
    html: String,
}

/// Browser backend over static HTML.
pub struct HtmlBrowser<S> {
    source: S,
    page: Option<CurrentPage>,
    generation: u64,
}

impl<S: PageSource> HtmlBrowser<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page: None,
            generation: 0,
        }
    }

    fn current(&self) -> Result<&CurrentPage, BrowserError> {
        self.page.as_ref().ok_or_else(|| BrowserError::Load {
            url: "about:blank".to_string(),
            message: "no page loaded".to_string(),
        })
    }

    async fn load(&mut self, url: Url) -> Result<LoadedPage, BrowserError> {
        let fetched = self.source.fetch(&url).await?;
        let title = document_title(&fetched.html);
        self.generation += 1;
        let loaded = LoadedPage {
            url: fetched.url.to_string(),
            title,
        };
        self.page = Some(CurrentPage {
            url: fetched.url,
            html: fetched.html,
        });
        Ok(loaded)
    }

    fn resolve(&self, href: &str) -> Result<Url, BrowserError> {
        let parsed = match &self.page {
            Some(page) => page.url.join(href),
            None => Url::parse(href),
        };
        parsed.map_err(|e| BrowserError::Load {
            url: href.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl<S: PageSource> Browser for HtmlBrowser<S> {
    async fn goto(&mut self, url: &str) -> Result<LoadedPage, BrowserError> {
        let url = self.resolve(url)?;
        match self.load(url.clone()).await {
            Ok(page) => Ok(page),
            Err(e) => {
                // Like a real browser, a failed load leaves an empty error
                // document behind rather than the previous page.
                self.generation += 1;
                self.page = Some(CurrentPage {
                    url,
                    html: String::new(),
                });
                Err(e)
            }
        }
    }

    async fn find(
        &mut self,
        query: &Query,
        scope: Scope<'_>,
    ) -> Result<Vec<ElementSnapshot>, BrowserError> {
        let page = self.current()?;
        evaluate(page, self.generation, query, scope)
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), BrowserError> {
        if element.handle.generation != self.generation {
            return Err(BrowserError::Detached);
        }
        let target = element
            .attr("data-href")
            .or_else(|| element.href())
            .filter(|h| !h.starts_with("javascript:") && !h.ends_with('#'))
            .map(str::to_string);

        match target {
            Some(target) => {
                let url = self.resolve(&target)?;
                self.load(url).await.map(|_| ())
            }
            None => {
                debug!("Click on <{}> has no navigation target", element.tag);
                Ok(())
            }
        }
    }

    async fn body_text(&mut self) -> Result<String, BrowserError> {
        let page = self.current()?;
        let document = Html::parse_document(&page.html);
        let text = match document.select(&selector("body")?).next() {
            Some(body) => rendered_text(body),
            None => rendered_text(document.root_element()),
        };
        Ok(text)
    }

    async fn title(&mut self) -> Result<String, BrowserError> {
        Ok(document_title(&self.current()?.html))
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.current()?.url.to_string())
    }

    /// Static pages have no rendering; the capture is the HTML source.
    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let html = self.current()?.html.clone();
        tokio::fs::write(path, html).await?;
        Ok(())
    }

    fn screenshot_extension(&self) -> &'static str {
        "html"
    }
}

fn selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| BrowserError::Query {
        query: css.to_string(),
        message: e.to_string(),
    })
}

fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(title) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&title)
        .next()
        .map(|t| t.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn valid_tag(tag: &str) -> Result<&str, BrowserError> {
    if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '*') {
        Ok(tag)
    } else {
        Err(BrowserError::Query {
            query: tag.to_string(),
            message: "label queries take a bare tag name".to_string(),
        })
    }
}

/// Run a query over the current document. Everything here is synchronous so
/// the parsed tree never lives across an await point.
fn evaluate(
    page: &CurrentPage,
    generation: u64,
    query: &Query,
    scope: Scope<'_>,
) -> Result<Vec<ElementSnapshot>, BrowserError> {
    let document = Html::parse_document(&page.html);
    let elements: Vec<ElementRef<'_>> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect();
    let positions: HashMap<_, usize> = elements
        .iter()
        .enumerate()
        .map(|(index, el)| (el.id(), index))
        .collect();

    let root = match scope {
        Scope::Document => document.root_element(),
        Scope::Within(parent) => {
            if parent.handle.generation != generation {
                return Err(BrowserError::Detached);
            }
            *elements
                .get(parent.handle.index)
                .ok_or(BrowserError::Detached)?
        }
    };

    let matched: Vec<ElementRef<'_>> = match query {
        Query::Css(css) => root.select(&selector(css)?).collect(),
        Query::Contains { tag, text } => labels(root, valid_tag(tag)?, text)?,
        Query::Following { tag, text } => labels(root, valid_tag(tag)?, text)?
            .into_iter()
            .filter_map(|label| label.next_siblings().find_map(ElementRef::wrap))
            .collect(),
    };

    Ok(matched
        .into_iter()
        .filter_map(|el| {
            let index = *positions.get(&el.id())?;
            Some(snapshot(&page.url, generation, index, el))
        })
        .collect())
}

fn labels<'a>(
    root: ElementRef<'a>,
    tag: &str,
    text: &str,
) -> Result<Vec<ElementRef<'a>>, BrowserError> {
    Ok(root
        .select(&selector(tag)?)
        .filter(|el| own_text(*el).contains(text))
        .collect())
}

fn snapshot(base: &Url, generation: u64, index: usize, el: ElementRef<'_>) -> ElementSnapshot {
    let mut attributes: HashMap<String, String> = el
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    if let Some(href) = attributes.get_mut("href") {
        if let Ok(resolved) = base.join(href.trim()) {
            *href = resolved.to_string();
        }
    }

    ElementSnapshot {
        handle: ElementHandle { generation, index },
        tag: el.value().name().to_string(),
        text: rendered_text(el),
        attributes,
        visible: is_visible(el),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSite;

    const DETAIL: &str = r#"
        <html><head><title>Lincoln Elementary | Directory</title></head>
        <body>
          <h1 class="name">Lincoln Elementary</h1>
          <h1 class="name" style="display:none">Hidden Copy</h1>
          <div class="contact">
            <div>Phone:</div><div>(512) 555-0100</div>
            <a href="/schools/1/map">Map</a>
          </div>
          <table><tr><td><a href="detail/7">Seven</a></td></tr></table>
        </body></html>"#;

    async fn browser() -> HtmlBrowser<FixtureSite> {
        let site = FixtureSite::new().page("https://example.org/schools/1/overview", DETAIL);
        let mut browser = HtmlBrowser::new(site);
        browser
            .goto("https://example.org/schools/1/overview")
            .await
            .unwrap();
        browser
    }

    #[tokio::test]
    async fn test_css_query_reports_visibility() {
        let mut browser = browser().await;
        let found = browser
            .find(&Query::css("h1.name"), Scope::Document)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].visible);
        assert!(!found[1].visible);
        assert_eq!(found[0].text, "Lincoln Elementary");
    }

    #[tokio::test]
    async fn test_following_query_returns_sibling_value() {
        let mut browser = browser().await;
        let found = browser
            .find(&Query::following("div", "Phone:"), Scope::Document)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "(512) 555-0100");
    }

    #[tokio::test]
    async fn test_scoped_query_and_resolved_href() {
        let mut browser = browser().await;
        let contact = browser
            .find(&Query::css("div.contact"), Scope::Document)
            .await
            .unwrap()
            .remove(0);
        let links = browser
            .find(&Query::css("a"), Scope::Within(&contact))
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href(), Some("https://example.org/schools/1/map"));
    }

    #[tokio::test]
    async fn test_title_and_body_text() {
        let mut browser = browser().await;
        assert_eq!(browser.title().await.unwrap(), "Lincoln Elementary | Directory");
        let body = browser.body_text().await.unwrap();
        assert!(body.contains("(512) 555-0100"));
        assert!(!body.contains("Hidden Copy"));
    }

    #[tokio::test]
    async fn test_click_follows_href_and_detaches_old_handles() {
        let site = FixtureSite::new()
            .page(
                "https://example.org/list",
                r#"<a class="next" href="/list?page=2">Next</a>"#,
            )
            .page("https://example.org/list?page=2", "<p>page two</p>");
        let mut browser = HtmlBrowser::new(site);
        browser.goto("https://example.org/list").await.unwrap();

        let next = browser
            .find(&Query::css("a.next"), Scope::Document)
            .await
            .unwrap()
            .remove(0);
        browser.click(&next).await.unwrap();

        assert_eq!(
            browser.current_url().await.unwrap(),
            "https://example.org/list?page=2"
        );
        assert!(matches!(
            browser.click(&next).await,
            Err(BrowserError::Detached)
        ));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_blank_page() {
        let mut browser = browser().await;
        assert!(browser.goto("https://example.org/missing").await.is_err());

        assert_eq!(browser.current_url().await.unwrap(), "https://example.org/missing");
        assert_eq!(browser.title().await.unwrap(), "");
        assert!(browser
            .find(&Query::css("h1"), Scope::Document)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_selector_is_a_query_error() {
        let mut browser = browser().await;
        let err = browser
            .find(&Query::css("a[href"), Scope::Document)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Query { .. }));
    }
}
