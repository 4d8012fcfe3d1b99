//! Page loads with retry, backoff and politeness delays.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::pacing::{backoff_delay, PauseKind, Sleeper};
use crate::browser::{Browser, ElementSnapshot, Query, Scope};
use crate::config::Settings;
use crate::error::{BrowserError, Result, ScrapeError};

/// State of the browser after a navigation.
///
/// A context whose `error` is set is degraded: every attempt failed and the
/// browser shows whatever it was left on (possibly an error page). Callers
/// may still try to extract from it.
#[derive(Debug)]
pub struct PageContext {
    /// URL the browser ended up on.
    pub url: String,
    pub title: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub error: Option<ScrapeError>,
}

impl PageContext {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Pacing parameters, taken from [`Settings`].
#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub request_delay: Duration,
    pub settle_delay: Duration,
    pub record_delay: Duration,
}

impl From<&Settings> for NavigationPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            retry_attempts: settings.retry_attempts.max(1),
            retry_delay: settings.retry_delay,
            request_delay: settings.request_delay,
            settle_delay: settings.settle_delay,
            record_delay: settings.record_delay,
        }
    }
}

/// Owns the browser session for the duration of a run.
pub struct NavigationController {
    browser: Box<dyn Browser>,
    sleeper: Arc<dyn Sleeper>,
    policy: NavigationPolicy,
}

impl NavigationController {
    pub fn new(
        browser: Box<dyn Browser>,
        policy: NavigationPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            browser,
            sleeper,
            policy,
        }
    }

    /// Load `url`, retrying with exponential backoff.
    ///
    /// Only an empty URL is an error. Exhausted retries produce a degraded
    /// [`PageContext`] instead, so one bad page never stops the run. The
    /// politeness delay is applied after every call either way.
    pub async fn navigate(&mut self, url: &str) -> Result<PageContext> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ScrapeError::InvalidArgument(
                "navigation URL cannot be empty".to_string(),
            ));
        }

        let max_attempts = self.policy.retry_attempts;
        let mut last_error: Option<BrowserError> = None;
        let mut context = None;

        for attempt in 1..=max_attempts {
            debug!("Navigating to {} (attempt {}/{})", url, attempt, max_attempts);
            match self.browser.goto(url).await {
                Ok(page) => {
                    context = Some(PageContext {
                        url: page.url,
                        title: page.title,
                        attempts: attempt,
                        error: None,
                    });
                    break;
                }
                Err(e) => {
                    warn!(
                        "Error navigating to {}: {}. Attempt {}/{}",
                        url, e, attempt, max_attempts
                    );
                    last_error = Some(e);
                    if attempt < max_attempts {
                        let wait = backoff_delay(attempt, self.policy.retry_delay);
                        info!("Waiting {:?} before retrying...", wait);
                        self.sleeper.sleep(PauseKind::Backoff, wait).await;
                    }
                }
            }
        }

        let context = match context {
            Some(context) => context,
            None => {
                let source = last_error.unwrap_or(BrowserError::Load {
                    url: url.to_string(),
                    message: "no attempts made".to_string(),
                });
                error!(
                    "Failed to navigate to {} after {} attempts: {}",
                    url, max_attempts, source
                );
                // Whatever the browser is showing now is the best we have.
                let current = self.browser.current_url().await.unwrap_or_default();
                let title = self.browser.title().await.unwrap_or_default();
                PageContext {
                    url: current,
                    title,
                    attempts: max_attempts,
                    error: Some(ScrapeError::Navigation {
                        url: url.to_string(),
                        attempts: max_attempts,
                        source,
                    }),
                }
            }
        };

        self.pause(PauseKind::Request).await;
        Ok(context)
    }

    /// Sleep for the configured duration of `kind`.
    pub async fn pause(&self, kind: PauseKind) {
        let duration = match kind {
            PauseKind::Backoff => self.policy.retry_delay,
            PauseKind::Request => self.policy.request_delay,
            PauseKind::Settle => self.policy.settle_delay,
            PauseKind::Record => self.policy.record_delay,
        };
        self.sleeper.sleep(kind, duration).await;
    }

    /// Query the current page. Backend failures read as "no match".
    pub async fn find(&mut self, query: &Query, scope: Scope<'_>) -> Vec<ElementSnapshot> {
        match self.browser.find(query, scope).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Query {} failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Visible matches of a query.
    pub async fn find_visible(&mut self, query: &Query, scope: Scope<'_>) -> Vec<ElementSnapshot> {
        self.find(query, scope)
            .await
            .into_iter()
            .filter(|e| e.visible)
            .collect()
    }

    /// Click with a script-dispatched fallback, then let the page settle.
    pub async fn click(&mut self, element: &ElementSnapshot) -> Result<()> {
        if let Err(e) = self.browser.click(element).await {
            debug!("Regular click failed ({}), trying JS click", e);
            self.browser.js_click(element).await?;
        }
        self.pause(PauseKind::Settle).await;
        Ok(())
    }

    pub async fn body_text(&mut self) -> String {
        self.browser.body_text().await.unwrap_or_else(|e| {
            debug!("Could not read page text: {}", e);
            String::new()
        })
    }

    pub async fn title(&mut self) -> String {
        self.browser.title().await.unwrap_or_default()
    }

    pub async fn current_url(&mut self) -> String {
        self.browser.current_url().await.unwrap_or_default()
    }

    /// Save a debug capture as `<stem>.<ext>` in `dir`, with the extension
    /// chosen by the backend. Failures only log.
    pub async fn screenshot(&mut self, dir: &Path, stem: &str) {
        let path = dir.join(format!("{}.{}", stem, self.browser.screenshot_extension()));
        match self.browser.screenshot(&path).await {
            Ok(()) => debug!("Saved screenshot {}", path.display()),
            Err(e) => warn!("Could not save screenshot {}: {}", path.display(), e),
        }
    }

    /// Release the browser session.
    pub async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Error closing browser: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSite;
    use crate::browser::HtmlBrowser;
    use crate::scrapers::pacing::RecordingSleeper;

    fn policy() -> NavigationPolicy {
        NavigationPolicy {
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_delay: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            record_delay: Duration::from_secs(1),
        }
    }

    fn controller(site: FixtureSite) -> (NavigationController, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let nav = NavigationController::new(
            Box::new(HtmlBrowser::new(site)),
            policy(),
            Arc::new(sleeper.clone()),
        );
        (nav, sleeper)
    }

    const URL: &str = "https://example.org/schools/1";

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_after_two_backoffs() {
        let site = FixtureSite::new()
            .page(URL, "<title>Lincoln Elementary</title>")
            .failing(URL, 2);
        let (mut nav, sleeper) = controller(site.clone());

        let context = nav.navigate(URL).await.unwrap();

        assert!(!context.is_degraded());
        assert_eq!(context.attempts, 3);
        assert_eq!(context.title, "Lincoln Elementary");
        assert_eq!(site.request_count(URL), 3);
        assert_eq!(
            sleeper.of_kind(PauseKind::Backoff),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(sleeper.of_kind(PauseKind::Request), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_degraded_context() {
        let (mut nav, sleeper) = controller(FixtureSite::new());

        let context = nav.navigate(URL).await.unwrap();

        assert!(context.is_degraded());
        assert_eq!(context.attempts, 3);
        assert!(matches!(
            context.error,
            Some(ScrapeError::Navigation { attempts: 3, .. })
        ));
        // No backoff after the final attempt, but the request delay still applies.
        assert_eq!(sleeper.of_kind(PauseKind::Backoff).len(), 2);
        assert_eq!(sleeper.of_kind(PauseKind::Request).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid_argument() {
        let (mut nav, sleeper) = controller(FixtureSite::new());
        assert!(matches!(
            nav.navigate("  ").await,
            Err(ScrapeError::InvalidArgument(_))
        ));
        assert!(sleeper.pauses().is_empty());
    }

    #[tokio::test]
    async fn test_click_settles_and_follows_link() {
        let site = FixtureSite::new()
            .page(URL, r#"<a id="all" href="/schools?all=1">Show all</a>"#)
            .page("https://example.org/schools?all=1", "<p>everything</p>");
        let (mut nav, sleeper) = controller(site);
        nav.navigate(URL).await.unwrap();

        let button = nav
            .find_visible(&Query::css("#all"), Scope::Document)
            .await
            .remove(0);
        nav.click(&button).await.unwrap();

        assert_eq!(nav.current_url().await, "https://example.org/schools?all=1");
        assert_eq!(
            sleeper.of_kind(PauseKind::Settle),
            vec![Duration::from_millis(500)]
        );
    }

    #[tokio::test]
    async fn test_bad_query_reads_as_no_match() {
        let site = FixtureSite::new().page(URL, "<p>x</p>");
        let (mut nav, _) = controller(site);
        nav.navigate(URL).await.unwrap();
        assert!(nav.find(&Query::css("a[href"), Scope::Document).await.is_empty());
    }
}
