//! Per-record field extraction from detail pages.

use tracing::{debug, info, warn};
use url::Url;

use super::context::RunContext;
use super::navigation::NavigationController;
use super::strategy::{resolve, resolve_with};
use crate::browser::{Query, Scope};
use crate::models::{CandidateLink, Field, Record};
use crate::normalize::{
    clean_title, is_map_link, normalize_address, normalize_phone, normalize_url, parse_map_link,
    title_from_slug,
};

/// What happened to one candidate link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    Extracted(Record),
    /// The page was read but the record failed name validation.
    Rejected {
        url: String,
        name: String,
        reason: String,
    },
    /// The page was never read.
    Skipped { url: String, reason: String },
}

impl DetailOutcome {
    pub fn record(&self) -> Option<&Record> {
        match self {
            DetailOutcome::Extracted(record) => Some(record),
            _ => None,
        }
    }
}

/// Postal fields that may carry their own strategies.
const POSTAL_FIELDS: [Field; 4] = [
    Field::AddressLine2,
    Field::City,
    Field::Region,
    Field::PostalCode,
];

pub struct DetailExtractor<'a> {
    ctx: &'a RunContext,
    captured_first: bool,
}

impl<'a> DetailExtractor<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            captured_first: false,
        }
    }

    /// Extract one record. Never fails: every problem becomes a skipped or
    /// rejected outcome so the batch carries on.
    pub async fn extract(
        &mut self,
        nav: &mut NavigationController,
        link: &CandidateLink,
    ) -> DetailOutcome {
        let ctx = self.ctx;
        let profile = &ctx.profile;
        let skipped = |reason: String| DetailOutcome::Skipped {
            url: link.url.clone(),
            reason,
        };

        let Some(captures) = ctx.detail_pattern.captures(&link.url) else {
            debug!("Skipping {}: not a detail page URL", link.url);
            return skipped("URL does not look like a detail page".to_string());
        };
        let id = captures.get(1).map(|m| m.as_str().to_string());
        let slug = captures.get(2).map(|m| m.as_str().to_string());

        info!("Extracting {}", link.url);
        let page = match nav.navigate(&link.url).await {
            Ok(page) => page,
            Err(e) => return skipped(e.to_string()),
        };
        if page.is_degraded() {
            warn!("Extracting from a degraded page for {}", link.url);
        }

        let mut title = page.title;
        if self.is_error_title(&title) {
            if let Some(id) = &id {
                title = self.try_alternates(nav, id, title).await;
            }
        }
        let error_page = self.is_error_title(&title);

        if let Some(dir) = &ctx.settings.screenshots_dir {
            let tag = id.as_deref().unwrap_or("page");
            if error_page {
                nav.screenshot(dir, &format!("{}_error_{}", profile.id, tag))
                    .await;
            } else if !self.captured_first {
                self.captured_first = true;
                nav.screenshot(dir, &format!("{}_detail_{}", profile.id, tag))
                    .await;
            }
        }

        let name = self
            .extract_name(nav, link, slug.as_deref(), id.as_deref(), &title, error_page)
            .await;
        let Some(name) = name else {
            warn!("No name found on {}", link.url);
            return DetailOutcome::Rejected {
                url: link.url.clone(),
                name: String::new(),
                reason: "no name found".to_string(),
            };
        };

        let mut record = Record::named(name.as_str());

        if let Some(org) = self.field(nav, Field::ParentOrganization).await {
            record.set(Field::ParentOrganization, org);
        }

        self.extract_address(nav, &mut record).await;
        self.extract_phone(nav, &mut record).await;
        self.extract_website(nav, link, &mut record).await;

        if let Some(grades) = self.field(nav, Field::GradesServed).await {
            record.set(Field::GradesServed, grades);
        }

        if record.has_address() {
            if let Some(region) = &profile.default_region {
                record.set_if_absent(Field::Region, region.as_str());
            }
        }

        if ctx.name_rules.is_valid(&name) {
            debug!("Extracted {:?}", record);
            DetailOutcome::Extracted(record)
        } else {
            warn!("Rejecting {}: invalid name {:?}", link.url, name);
            DetailOutcome::Rejected {
                url: link.url.clone(),
                name,
                reason: "name failed validation".to_string(),
            }
        }
    }

    fn is_error_title(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        self.ctx
            .profile
            .error_title_markers
            .iter()
            .any(|marker| lower.contains(marker.as_str()))
    }

    /// Try the alternate detail URLs in order; returns the title of the page
    /// the browser ends up on.
    async fn try_alternates(&self, nav: &mut NavigationController, id: &str, title: String) -> String {
        for template in &self.ctx.profile.alternate_detail_urls {
            let url = template.replace("{id}", id);
            info!("Error page ({:?}), trying alternate URL {}", title, url);
            match nav.navigate(&url).await {
                Ok(page) if !page.is_degraded() && !self.is_error_title(&page.title) => {
                    return page.title;
                }
                Ok(_) => debug!("Alternate {} did not help", url),
                Err(e) => debug!("Alternate {} failed: {}", url, e),
            }
        }
        title
    }

    async fn extract_name(
        &self,
        nav: &mut NavigationController,
        link: &CandidateLink,
        slug: Option<&str>,
        id: Option<&str>,
        title: &str,
        error_page: bool,
    ) -> Option<String> {
        if let Some(hint) = &link.name_hint {
            debug!("Using listing name {:?}", hint);
            return Some(hint.clone());
        }
        if let Some(name) = self.field(nav, Field::Name).await {
            return Some(name);
        }
        if let Some(name) = slug.map(title_from_slug).filter(|n| !n.is_empty()) {
            debug!("Name from URL slug: {}", name);
            return Some(name);
        }
        if !error_page {
            let cleaned = clean_title(title, &self.ctx.profile.title_delimiters);
            if !cleaned.is_empty() {
                debug!("Name from page title: {}", cleaned);
                return Some(cleaned);
            }
        }
        match (&self.ctx.profile.name_from_id, id) {
            (Some(template), Some(id)) => Some(template.replace("{id}", id)),
            _ => None,
        }
    }

    async fn field(&self, nav: &mut NavigationController, field: Field) -> Option<String> {
        let strategies = self.ctx.profile.strategies_for(field);
        if strategies.is_empty() {
            return None;
        }
        resolve(nav, strategies, Scope::Document).await
    }

    async fn extract_address(&self, nav: &mut NavigationController, record: &mut Record) {
        for field in POSTAL_FIELDS {
            if let Some(value) = self.field(nav, field).await {
                record.set(field, value);
            }
        }

        let pattern = &self.ctx.address_pattern;
        let structured = resolve_with(
            nav,
            self.ctx.profile.strategies_for(Field::AddressLine1),
            Scope::Document,
            |raw| Some(normalize_address(raw, pattern)).filter(|parts| !parts.is_empty()),
        )
        .await;

        let parts = match structured {
            Some(parts) => Some(parts),
            None => {
                let body = nav.body_text().await;
                self.ctx.find_address(&body).map(|found| {
                    debug!("Address from page text: {}", found);
                    normalize_address(found, pattern)
                })
            }
        };
        if let Some(parts) = parts {
            parts.apply_to(record);
        }
    }

    async fn extract_phone(&self, nav: &mut NavigationController, record: &mut Record) {
        let raw = match self.field(nav, Field::Phone).await {
            Some(raw) => Some(raw),
            None => {
                let body = nav.body_text().await;
                self.ctx.find_phone(&body).map(str::to_string)
            }
        };
        if let Some(raw) = raw {
            record.set(Field::Phone, normalize_phone(&raw));
        }
    }

    async fn extract_website(
        &self,
        nav: &mut NavigationController,
        link: &CandidateLink,
        record: &mut Record,
    ) {
        let source_host = Url::parse(&link.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let excluded = &self.ctx.profile.excluded_website_domains;
        let mut map_link: Option<String> = None;

        let website = resolve_with(
            nav,
            self.ctx.profile.strategies_for(Field::Website),
            Scope::Document,
            |raw| {
                if is_map_link(raw) {
                    map_link.get_or_insert_with(|| raw.to_string());
                    return None;
                }
                external_website(raw, source_host.as_deref(), excluded)
            },
        )
        .await;

        if let Some(website) = website {
            record.set(Field::Website, website);
        }

        if record.has_address() {
            return;
        }
        if map_link.is_none() {
            map_link = nav
                .find_visible(&Query::css("a[href]"), Scope::Document)
                .await
                .iter()
                .filter_map(|a| a.href())
                .find(|href| is_map_link(href))
                .map(str::to_string);
        }
        if let Some(map_link) = map_link {
            let parts = parse_map_link(&map_link);
            if !parts.is_empty() {
                debug!("Address from map link {}", map_link);
                parts.apply_to(record);
            }
        }
    }
}

/// Normalize `raw` as an entity's own website. Links back into the directory
/// (`source_host`) and into excluded domains are not websites.
pub(super) fn external_website(
    raw: &str,
    source_host: Option<&str>,
    excluded: &[String],
) -> Option<String> {
    let url = normalize_url(raw)?;
    let host = Url::parse(&url).ok()?.host_str()?.to_ascii_lowercase();
    let own = source_host.is_some_and(|s| host_matches(&host, s));
    if own || excluded.iter().any(|d| host_matches(&host, d)) {
        return None;
    }
    Some(url)
}

/// `host` is `domain` or one of its subdomains.
fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_ascii_lowercase();
    let host = host.trim_start_matches("www.");
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}
