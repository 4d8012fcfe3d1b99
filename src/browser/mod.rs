//! Browser capability consumed by the extraction pipeline.
//!
//! The pipeline only ever talks to the [`Browser`] trait. Two backends exist:
//! [`ChromeBrowser`] drives a real Chromium over CDP for JavaScript-rendered
//! directories, and [`HtmlBrowser`] evaluates the same queries against static
//! HTML fetched over HTTP (or served from fixtures in tests).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;

#[cfg(feature = "browser")]
mod chrome;
#[cfg(test)]
pub(crate) mod fixture;
mod html;
mod text;

#[cfg(feature = "browser")]
pub use chrome::{ChromeBrowser, ChromeOptions};
pub use html::{FetchedPage, HtmlBrowser, HttpSource, PageSource};

/// A structural query against the current document.
///
/// `Contains` and `Following` express the "label element" idiom found on
/// directory detail pages (`<div>Phone:</div><div>(512) 555-0100</div>`):
/// `Contains` matches a `tag` element whose own text contains `text`, and
/// `Following` yields the next element sibling of such a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Css(String),
    Contains { tag: String, text: String },
    Following { tag: String, text: String },
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Query::Css(selector.into())
    }

    pub fn contains(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Contains {
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn following(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Following {
            tag: tag.into(),
            text: text.into(),
        }
    }

    /// Equivalent XPath 1.0 expression, for backends that evaluate XPath.
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Query::Css(_) => None,
            Query::Contains { tag, text } => Some(format!(
                "//{}[text()[contains(., {})]]",
                tag,
                xpath_literal(text)
            )),
            Query::Following { tag, text } => Some(format!(
                "//{}[text()[contains(., {})]]/following-sibling::*[1]",
                tag,
                xpath_literal(text)
            )),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Css(selector) => write!(f, "css({})", selector),
            Query::Contains { tag, text } => write!(f, "{}:contains({:?})", tag, text),
            Query::Following { tag, text } => write!(f, "{}:contains({:?}) + *", tag, text),
        }
    }
}

fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        format!("'{}'", text.replace('\'', ""))
    }
}

/// Where a query is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Document,
    Within(&'a ElementSnapshot),
}

/// Opaque reference back to a live element, valid until the page changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHandle {
    pub(crate) generation: u64,
    pub(crate) index: usize,
}

/// Element state captured at query time.
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub(crate) handle: ElementHandle,
    pub tag: String,
    /// Rendered text, one line per block element.
    pub text: String,
    /// Attributes; `href` is resolved against the page URL.
    pub attributes: HashMap<String, String>,
    pub visible: bool,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href").filter(|h| !h.trim().is_empty())
    }

    /// Disabled controls: `disabled` attribute, `aria-disabled="true"`, or a
    /// class name mentioning "disabled".
    pub fn is_disabled(&self) -> bool {
        self.attributes.contains_key("disabled")
            || self.attr("aria-disabled") == Some("true")
            || self
                .attr("class")
                .map(|c| c.to_ascii_lowercase().contains("disabled"))
                .unwrap_or(false)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Result of a completed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    /// URL after redirects.
    pub url: String,
    pub title: String,
}

/// The DOM-query capability the pipeline depends on.
#[async_trait]
pub trait Browser: Send {
    /// Load `url` and make it the current document.
    async fn goto(&mut self, url: &str) -> Result<LoadedPage, BrowserError>;

    /// Evaluate a structural query, in document order.
    async fn find(
        &mut self,
        query: &Query,
        scope: Scope<'_>,
    ) -> Result<Vec<ElementSnapshot>, BrowserError>;

    /// Click an element through the normal input path.
    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), BrowserError>;

    /// Click by dispatching the event from script, for elements covered by
    /// overlays. Backends without script support fall back to `click`.
    async fn js_click(&mut self, element: &ElementSnapshot) -> Result<(), BrowserError> {
        self.click(element).await
    }

    /// Rendered text of the whole page body.
    async fn body_text(&mut self) -> Result<String, BrowserError>;

    async fn title(&mut self) -> Result<String, BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Save a capture of the current page for debugging.
    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;

    /// File extension of what `screenshot` writes.
    fn screenshot_extension(&self) -> &'static str;

    /// Release the session. Called exactly once at the end of a run.
    async fn close(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }
}
