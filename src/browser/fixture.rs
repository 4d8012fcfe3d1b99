//! In-memory page source for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use super::html::{FetchedPage, PageSource};
use crate::error::BrowserError;

#[derive(Default)]
struct State {
    /// Remaining injected failures per URL.
    failures: HashMap<String, u32>,
    requests: Vec<String>,
}

/// Serves canned HTML keyed by absolute URL.
///
/// Unknown URLs produce a load error. Cloned handles share the request log,
/// so a test can keep one to inspect traffic after handing the other to a
/// browser.
#[derive(Clone, Default)]
pub struct FixtureSite {
    pages: Arc<HashMap<String, String>>,
    state: Arc<Mutex<State>>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        Arc::make_mut(&mut self.pages).insert(canonical(url), html.to_string());
        self
    }

    /// Fail the next `times` fetches of `url`.
    pub fn failing(self, url: &str, times: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(canonical(url), times);
        }
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        let url = canonical(url);
        self.requests().iter().filter(|r| **r == url).count()
    }
}

fn canonical(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl PageSource for FixtureSite {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, BrowserError> {
        let key = url.to_string();
        let injected = {
            let mut state = self.state.lock().map_err(|_| BrowserError::Detached)?;
            state.requests.push(key.clone());
            match state.failures.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if injected {
            return Err(BrowserError::Load {
                url: key,
                message: "injected failure".to_string(),
            });
        }

        match self.pages.get(&key) {
            Some(html) => Ok(FetchedPage {
                url: url.clone(),
                html: html.clone(),
            }),
            None => Err(BrowserError::Load {
                url: key,
                message: "HTTP 404".to_string(),
            }),
        }
    }
}
