//! Candidate link discovery on listing pages.
//!
//! After the profile's search and filter controls are applied, collection
//! runs through a fixed sequence of stages and stops at the first one that
//! produces links: a bulk "show all" control, an enumerated filter (one key
//! at a time), a paginated results table, a keyword scan over every anchor,
//! and finally the profile's seed URLs.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::context::RunContext;
use super::navigation::NavigationController;
use super::sites::{PrepareStep, SiteProfile};
use crate::browser::{ElementSnapshot, Query, Scope};
use crate::error::Result;
use crate::models::{CandidateLink, LinkSource};

pub(super) const ROW_SELECTOR: &str = "tr, [role='row']";
pub(super) const CELL_SELECTOR: &str = "td, [role='cell']";
pub(super) const HEADER_SELECTOR: &str = "th, [role='columnheader']";

/// Deduplicated, capped list of candidate links.
///
/// Name hints live in a side table keyed by URL so that a hint seen on a
/// later sighting of an already-collected link is not lost.
#[derive(Debug, Default)]
pub struct LinkSet {
    links: Vec<CandidateLink>,
    seen: HashSet<String>,
    hints: HashMap<String, String>,
    cap: usize,
}

impl LinkSet {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.links.len() >= self.cap
    }

    /// Add a link. Returns `true` only when the URL was new and under the cap.
    pub fn push(&mut self, link: CandidateLink) -> bool {
        if let Some(hint) = &link.name_hint {
            self.hints
                .entry(link.url.clone())
                .or_insert_with(|| hint.clone());
        }
        if self.is_full() || self.seen.contains(&link.url) {
            return false;
        }
        self.seen.insert(link.url.clone());
        self.links.push(link);
        true
    }

    pub fn hint(&self, url: &str) -> Option<&str> {
        self.hints.get(url).map(String::as_str)
    }

    /// The collected links, with hints from the side table filled in.
    pub fn into_links(self) -> Vec<CandidateLink> {
        let LinkSet {
            mut links, hints, ..
        } = self;
        for link in &mut links {
            if link.name_hint.is_none() {
                link.name_hint = hints.get(&link.url).cloned();
            }
        }
        links
    }
}

/// Discovers detail-page links for one site.
pub struct LinkCollector<'a> {
    ctx: &'a RunContext,
}

impl<'a> LinkCollector<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Open the listing page and collect up to `max_records` links.
    ///
    /// Only an invalid listing URL is an error; a listing that fails to load
    /// simply yields nothing until the seed stage.
    pub async fn collect(&self, nav: &mut NavigationController) -> Result<Vec<CandidateLink>> {
        let mut links = LinkSet::new(self.ctx.max_records);
        if links.is_full() {
            info!("Record cap is 0, skipping link collection");
            return Ok(Vec::new());
        }

        let mut listing_url = self.open_listing(nav).await?;
        if let Some(dir) = &self.ctx.settings.screenshots_dir {
            nav.screenshot(dir, &format!("{}_listing", self.ctx.site_id()))
                .await;
        }
        self.dismiss_overlays(nav).await;

        if self.prepare(nav).await > 0 {
            // Later stages return here, not to the unfiltered listing.
            listing_url = nav.current_url().await;
        }

        let found = self.bulk(nav, &mut links).await;
        if found > 0 {
            info!("Bulk control revealed {} links", found);
            return Ok(links.into_links());
        }

        let found = self.partitioned(nav, &mut links).await;
        if found > 0 {
            info!("Partitioned listing yielded {} links", found);
        }

        if links.is_empty() {
            if nav.current_url().await != listing_url {
                nav.navigate(&listing_url).await?;
            }
            let found = self.paginated_table(nav, &mut links).await;
            if found > 0 {
                info!("Paginated listing yielded {} links", found);
            }
        }

        if links.is_empty() {
            let found = self.text_scan(nav, &mut links).await;
            if found > 0 {
                info!("Text scan yielded {} links", found);
            }
        }

        if links.is_empty() {
            self.seeds(&mut links);
        }

        info!("Collected {} candidate links", links.len());
        Ok(links.into_links())
    }

    /// Navigate to the listing, switching to the alternate listing when the
    /// first one is a block page. Returns the URL that was used.
    async fn open_listing(&self, nav: &mut NavigationController) -> Result<String> {
        let profile = &self.ctx.profile;
        info!("Opening listing {}", profile.listing_url);
        let page = nav.navigate(&profile.listing_url).await?;
        if page.is_degraded() {
            warn!("Listing page did not load cleanly, continuing with what we have");
        }

        let blocked = profile
            .block_markers
            .iter()
            .any(|marker| page.title.contains(marker.as_str()));
        match (&profile.alternate_listing_url, blocked) {
            (Some(alternate), true) => {
                warn!(
                    "Listing appears blocked (title: {:?}), trying {}",
                    page.title, alternate
                );
                nav.navigate(alternate).await?;
                Ok(alternate.clone())
            }
            _ => Ok(profile.listing_url.clone()),
        }
    }

    async fn dismiss_overlays(&self, nav: &mut NavigationController) {
        let profile = &self.ctx.profile;
        let Some(close_selector) = &profile.overlay_close_selector else {
            return;
        };
        let close_query = Query::css(close_selector.as_str());

        for selector in &profile.overlay_selectors {
            let overlays = nav
                .find_visible(&Query::css(selector.as_str()), Scope::Document)
                .await;
            for overlay in &overlays {
                let close = nav
                    .find_visible(&close_query, Scope::Within(overlay))
                    .await
                    .into_iter()
                    .next();
                if let Some(close) = close {
                    debug!("Dismissing overlay {}", selector);
                    if let Err(e) = nav.click(&close).await {
                        debug!("Could not dismiss overlay {}: {}", selector, e);
                    }
                    // Clicking may have replaced the page.
                    break;
                }
            }
        }
    }

    /// Apply the profile's search and filter steps. A step whose controls are
    /// missing is skipped. Returns the number of steps applied.
    async fn prepare(&self, nav: &mut NavigationController) -> usize {
        let mut applied = 0;
        for step in &self.ctx.profile.prepare_steps {
            if self.prepare_step(nav, step).await {
                applied += 1;
            }
        }
        if applied > 0 {
            info!("Applied {} listing preparation steps", applied);
        }
        applied
    }

    async fn prepare_step(&self, nav: &mut NavigationController, step: &PrepareStep) -> bool {
        let url = nav.current_url().await;
        if step
            .skip_when_url_contains
            .iter()
            .any(|fragment| url.contains(fragment.as_str()))
        {
            debug!("Skipping {}: listing already at {}", step.label, url);
            return false;
        }

        for control in &step.controls {
            let targets: Vec<ElementSnapshot> = nav
                .find_visible(control, Scope::Document)
                .await
                .into_iter()
                .filter(|e| !e.is_disabled() && !e.attributes.contains_key("checked"))
                .take(step.clicks.max(1))
                .collect();
            if targets.is_empty() {
                continue;
            }

            let mut clicked = 0;
            for target in &targets {
                match nav.click(target).await {
                    Ok(()) => clicked += 1,
                    Err(e) => {
                        // The page may have changed under the remaining matches.
                        debug!("Could not click {} ({}): {}", step.label, control, e);
                        break;
                    }
                }
            }
            if clicked > 0 {
                info!("Applied {} via {}", step.label, control);
                return true;
            }
        }
        debug!("No control found for {}", step.label);
        false
    }

    async fn bulk(&self, nav: &mut NavigationController, links: &mut LinkSet) -> usize {
        for control in &self.ctx.profile.bulk_controls {
            let Some(button) = enabled_control(nav, control).await else {
                continue;
            };
            info!("Clicking bulk control {}", control);
            if let Err(e) = nav.click(&button).await {
                warn!("Bulk control {} failed: {}", control, e);
                continue;
            }
            let added = self.harvest(nav, links, LinkSource::Bulk).await;
            if added > 0 {
                return added;
            }
            debug!("Bulk control {} revealed nothing", control);
        }
        0
    }

    async fn partitioned(&self, nav: &mut NavigationController, links: &mut LinkSet) -> usize {
        let profile = &self.ctx.profile;
        let mut total = 0;

        for key in &profile.partition_keys {
            if links.is_full() {
                info!("Reached limit of {} links", self.ctx.max_records);
                break;
            }

            let mut control = None;
            for template in &profile.partition_controls {
                let query = Query::css(template.replace("{key}", key));
                if let Some(found) = enabled_control(nav, &query).await {
                    control = Some(found);
                    break;
                }
            }
            let Some(control) = control else {
                debug!("No control for partition {}", key);
                continue;
            };

            if let Err(e) = nav.click(&control).await {
                warn!("Could not select partition {}: {}", key, e);
                continue;
            }
            let added = self.harvest(nav, links, LinkSource::Partition).await;
            if added == 0 {
                debug!("Partition {} yielded no new links", key);
            } else {
                info!("Partition {}: {} new links", key, added);
            }
            total += added;
        }
        total
    }

    async fn paginated_table(&self, nav: &mut NavigationController, links: &mut LinkSet) -> usize {
        let max_pages = self.ctx.max_pages.max(1);
        let mut total = 0;

        for page in 1..=max_pages {
            let mut added = self.harvest_table(nav, links).await;
            if added == 0 {
                added = self.harvest(nav, links, LinkSource::Table).await;
            }
            info!("Listing page {}: {} new links", page, added);
            total += added;

            if added == 0 || links.is_full() {
                break;
            }
            if page == max_pages {
                info!("Reached page limit of {}", max_pages);
                break;
            }

            let mut next = None;
            for control in &self.ctx.profile.next_controls {
                if let Some(found) = enabled_control(nav, control).await {
                    next = Some(found);
                    break;
                }
            }
            let Some(next) = next else {
                debug!("No enabled next-page control, last page reached");
                break;
            };
            if let Err(e) = nav.click(&next).await {
                warn!("Could not advance to page {}: {}", page + 1, e);
                break;
            }
        }
        total
    }

    /// Links from the first cell of each row of the results table.
    async fn harvest_table(&self, nav: &mut NavigationController, links: &mut LinkSet) -> usize {
        let row_query = Query::css(ROW_SELECTOR);
        let cell_query = Query::css(CELL_SELECTOR);
        let anchor_query = Query::css("a[href]");

        for table in results_tables(nav, &self.ctx.profile).await {
            let mut added = 0;
            for row in nav.find_visible(&row_query, Scope::Within(&table)).await {
                if links.is_full() {
                    break;
                }
                let cells = nav.find(&cell_query, Scope::Within(&row)).await;
                let Some(first) = cells.first() else {
                    continue;
                };
                let anchors = nav.find_visible(&anchor_query, Scope::Within(first)).await;
                added += self.add_anchors(&anchors, links, LinkSource::Table);
            }
            if added > 0 {
                return added;
            }
        }
        0
    }

    async fn text_scan(&self, nav: &mut NavigationController, links: &mut LinkSet) -> usize {
        let profile = &self.ctx.profile;
        let anchors = nav
            .find_visible(&Query::css("a[href]"), Scope::Document)
            .await;
        debug!("Text scan over {} anchors", anchors.len());

        let mut added = 0;
        for anchor in &anchors {
            if links.is_full() {
                break;
            }
            let text = first_line(&anchor.text);
            let lower = text.to_lowercase();
            if text.is_empty()
                || profile.text_scan_ignore.iter().any(|i| i == text)
                || !profile
                    .text_scan_keywords
                    .iter()
                    .any(|k| lower.contains(k.as_str()))
            {
                continue;
            }
            let Some(href) = anchor.href() else {
                continue;
            };
            if profile.link_filter.rejects(href) {
                continue;
            }
            if links.push(CandidateLink::new(href, LinkSource::TextScan).with_hint(self.hint(text))) {
                added += 1;
            }
        }
        added
    }

    fn seeds(&self, links: &mut LinkSet) {
        let seeds = &self.ctx.profile.seed_urls;
        if !self.ctx.allow_seed_links || seeds.is_empty() {
            warn!("No links found and no seed URLs available");
            return;
        }
        warn!(
            "No links discovered on the listing; falling back to {} seed URLs",
            seeds.len()
        );
        for url in seeds {
            links.push(CandidateLink::new(url.as_str(), LinkSource::Seed));
        }
    }

    /// Harvest the current page with the profile's link selectors. The first
    /// selector that adds anything wins.
    async fn harvest(
        &self,
        nav: &mut NavigationController,
        links: &mut LinkSet,
        source: LinkSource,
    ) -> usize {
        for selector in &self.ctx.profile.link_selectors {
            let anchors = nav
                .find_visible(&Query::css(selector.as_str()), Scope::Document)
                .await;
            let added = self.add_anchors(&anchors, links, source);
            if added > 0 {
                debug!("Selector {} added {} links", selector, added);
                return added;
            }
        }
        0
    }

    fn add_anchors(&self, anchors: &[ElementSnapshot], links: &mut LinkSet, source: LinkSource) -> usize {
        let mut added = 0;
        for anchor in anchors {
            if links.is_full() {
                break;
            }
            let Some(href) = anchor.href() else {
                continue;
            };
            if !self.ctx.profile.link_filter.allows(href) {
                continue;
            }
            let hint = self.hint(first_line(&anchor.text));
            if links.push(CandidateLink::new(href, source).with_hint(hint)) {
                added += 1;
            }
        }
        added
    }

    /// Listing text is only worth keeping as a name if it looks like one.
    fn hint(&self, text: &str) -> Option<String> {
        Some(text.to_string()).filter(|t| self.ctx.name_rules.is_valid(t))
    }
}

/// Visible tables on the current page whose headers mark them as the
/// results table, in profile selector order.
pub(super) async fn results_tables(
    nav: &mut NavigationController,
    profile: &SiteProfile,
) -> Vec<ElementSnapshot> {
    let header_query = Query::css(HEADER_SELECTOR);
    let mut found = Vec::new();
    for selector in &profile.table_selectors {
        let tables = nav
            .find_visible(&Query::css(selector.as_str()), Scope::Document)
            .await;
        for table in tables {
            if profile.table_header_keywords.is_empty() {
                found.push(table);
                continue;
            }
            let header_text = nav
                .find(&header_query, Scope::Within(&table))
                .await
                .iter()
                .map(|h| h.trimmed_text().to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            if profile
                .table_header_keywords
                .iter()
                .any(|k| header_text.contains(k.as_str()))
            {
                found.push(table);
            }
        }
    }
    found
}

/// First visible, enabled match of a control query.
async fn enabled_control(nav: &mut NavigationController, query: &Query) -> Option<ElementSnapshot> {
    nav.find_visible(query, Scope::Document)
        .await
        .into_iter()
        .find(|e| !e.is_disabled())
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSite;
    use crate::config::Settings;
    use crate::scrapers::pacing::PauseKind;
    use crate::scrapers::sites::{az_schools, tx_schools, SiteProfile};
    use crate::scrapers::testing::controller;

    const AZ_LISTING: &str = "https://azreportcards.azed.gov/schools";
    const TX_LISTING: &str = "https://txschools.gov/?view=schools&lng=en";

    fn context(profile: SiteProfile, max_records: usize) -> RunContext {
        let mut ctx = RunContext::new(profile, Settings::without_delays()).unwrap();
        ctx.max_records = max_records;
        ctx
    }

    async fn collect(ctx: &RunContext, site: FixtureSite) -> Vec<CandidateLink> {
        let (mut nav, _) = controller(site);
        LinkCollector::new(ctx).collect(&mut nav).await.unwrap()
    }

    fn urls(links: &[CandidateLink]) -> Vec<&str> {
        links.iter().map(|l| l.url.as_str()).collect()
    }

    fn assert_unique(links: &[CandidateLink]) {
        let unique: HashSet<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(unique.len(), links.len(), "duplicate URLs in {:?}", urls(links));
    }

    fn az_letter_bar() -> String {
        ('A'..='C')
            .map(|c| format!(r#"<button class="v-btn" value="{c}" data-href="/schools?letter={c}">{c}</button>"#))
            .collect()
    }

    fn az_entity(id: u32, name: &str) -> String {
        format!(
            r#"<p class="entity_name body-2 primary-text"><a class="no-underline" href="/schools/detail/{id}">{name}</a></p>"#
        )
    }

    #[test]
    fn test_link_set_dedupes_and_caps() {
        let mut set = LinkSet::new(2);
        assert!(set.push(CandidateLink::new("https://a/1", LinkSource::Bulk)));
        assert!(!set.push(
            CandidateLink::new("https://a/1", LinkSource::Bulk).with_hint(Some("Alpha School".into()))
        ));
        assert!(set.push(CandidateLink::new("https://a/2", LinkSource::Bulk)));
        assert!(set.is_full());
        assert!(!set.push(CandidateLink::new("https://a/3", LinkSource::Bulk)));

        // The hint from the duplicate sighting is kept in the side table.
        assert_eq!(set.hint("https://a/1"), Some("Alpha School"));
        let links = set.into_links();
        assert_eq!(urls(&links), vec!["https://a/1", "https://a/2"]);
        assert_eq!(links[0].name_hint.as_deref(), Some("Alpha School"));
    }

    #[tokio::test]
    async fn test_bulk_control_short_circuits() {
        let listing = format!(
            r#"<button value="ALL" data-href="/schools?letter=ALL">ALL</button>{}"#,
            az_letter_bar()
        );
        let all = format!(
            "{}{}{}{}",
            az_entity(1, "Mesa Academy"),
            az_entity(2, "Desert View High School"),
            az_entity(1, "Mesa Academy"),
            r#"<a class="no-underline" href="/about">About</a>"#
        );
        let site = FixtureSite::new()
            .page(AZ_LISTING, &listing)
            .page("https://azreportcards.azed.gov/schools?letter=ALL", &all);
        let ctx = context(az_schools(), 50);

        let links = collect(&ctx, site.clone()).await;

        assert_eq!(
            urls(&links),
            vec![
                "https://azreportcards.azed.gov/schools/detail/1",
                "https://azreportcards.azed.gov/schools/detail/2",
            ]
        );
        assert!(links.iter().all(|l| l.source == LinkSource::Bulk));
        assert_eq!(links[0].name_hint.as_deref(), Some("Mesa Academy"));
        // Partitions are never visited once the bulk control worked.
        assert_eq!(
            site.request_count("https://azreportcards.azed.gov/schools?letter=A"),
            0
        );
    }

    #[tokio::test]
    async fn test_partitions_skip_empty_keys_and_respect_cap() {
        let bar = az_letter_bar();
        let site = FixtureSite::new()
            .page(AZ_LISTING, &bar)
            .page(
                "https://azreportcards.azed.gov/schools?letter=A",
                &format!("{}{}{}", bar, az_entity(10, "Apache Elementary"), az_entity(11, "Aztec Middle School")),
            )
            .page("https://azreportcards.azed.gov/schools?letter=B", &bar)
            .page(
                "https://azreportcards.azed.gov/schools?letter=C",
                &format!("{}{}{}", bar, az_entity(10, "Apache Elementary"), az_entity(30, "Cactus High School")),
            );

        let links = collect(&context(az_schools(), 50), site.clone()).await;
        assert_eq!(links.len(), 3);
        assert_unique(&links);
        assert!(links.iter().all(|l| l.source == LinkSource::Partition));

        let capped = collect(&context(az_schools(), 2), site).await;
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_paginated_table_stops_at_disabled_next() {
        let row = |id: &str, name: &str| {
            format!(
                r#"<tr><td><a href="/schools/{id}/overview">{name}</a></td><td>Austin ISD</td></tr>"#
            )
        };
        let page = |rows: String, next: &str| {
            format!(
                r#"<table class="layout"><tr><td><a href="/schools/999999999/overview">Featured School</a></td></tr></table>
                   <table><thead><tr><th>School Name</th><th>District</th></tr></thead>
                   <tbody>{rows}</tbody></table>{next}"#
            )
        };
        let site = FixtureSite::new()
            .page(
                TX_LISTING,
                &page(
                    row("227901001", "Lincoln Elementary") + &row("227901002", "Travis High School"),
                    r#"<button aria-label="next page" data-href="/?view=schools&lng=en&page=2">Next</button>"#,
                ),
            )
            .page(
                "https://txschools.gov/?view=schools&lng=en&page=2",
                &page(
                    row("227901003", "Austin Academy") + &row("227901001", "Lincoln Elementary"),
                    r#"<button aria-label="next page" disabled data-href="/?view=schools&lng=en&page=3">Next</button>"#,
                ),
            );

        let links = collect(&context(tx_schools(), 50), site.clone()).await;

        assert_eq!(
            urls(&links),
            vec![
                "https://txschools.gov/schools/227901001/overview",
                "https://txschools.gov/schools/227901002/overview",
                "https://txschools.gov/schools/227901003/overview",
            ]
        );
        assert!(links.iter().all(|l| l.source == LinkSource::Table));
        assert_eq!(links[2].name_hint.as_deref(), Some("Austin Academy"));
        assert_eq!(
            site.request_count("https://txschools.gov/?view=schools&lng=en&page=3"),
            0
        );
    }

    #[tokio::test]
    async fn test_page_cap_limits_pagination() {
        let mut site = FixtureSite::new();
        for page in 1..=4 {
            let url = if page == 1 {
                TX_LISTING.to_string()
            } else {
                format!("{}&page={}", TX_LISTING, page)
            };
            site = site.page(
                &url,
                &format!(
                    r#"<table><tr><th>School Name</th></tr>
                       <tr><td><a href="/schools/10000000{page}/overview">School {page}</a></td></tr></table>
                       <a class="next-page" href="/?view=schools&lng=en&page={next}">Next</a>"#,
                    next = page + 1
                ),
            );
        }
        let mut ctx = context(tx_schools(), 50);
        ctx.max_pages = 2;

        let links = collect(&ctx, site).await;
        assert_eq!(links.len(), 2);
    }

    #[tokio::test]
    async fn test_text_scan_matches_keywords() {
        let listing = r#"
            <a href="https://www.lincolnisd.org/lincoln-elementary">Lincoln Elementary</a>
            <a href="https://www.lincolnisd.org/privacy-policy">Privacy Policy</a>
            <a href="https://www.lincolnisd.org/board">School Board Meetings</a>
            <a href="https://www.lincolnisd.org/news">News</a>
            <a href="https://www.lincolnisd.org/lincoln-elementary">Lincoln Elementary</a>"#;
        let site = FixtureSite::new().page(TX_LISTING, listing);

        let links = collect(&context(tx_schools(), 50), site).await;

        assert_eq!(
            urls(&links),
            vec![
                "https://www.lincolnisd.org/lincoln-elementary",
                "https://www.lincolnisd.org/board",
            ]
        );
        assert!(links.iter().all(|l| l.source == LinkSource::TextScan));
    }

    #[tokio::test]
    async fn test_empty_listing_falls_through_to_seeds() {
        let site = FixtureSite::new().page(AZ_LISTING, "<html><body><p>Nothing here</p></body></html>");
        let ctx = context(az_schools(), 50);

        let links = collect(&ctx, site).await;

        assert_eq!(urls(&links), ctx.profile.seed_urls.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(links.iter().all(|l| l.source == LinkSource::Seed));

        let mut no_seeds = context(az_schools(), 50);
        no_seeds.allow_seed_links = false;
        let site = FixtureSite::new().page(AZ_LISTING, "<p>Nothing here</p>");
        assert!(collect(&no_seeds, site).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_listing_still_uses_seeds() {
        let ctx = context(az_schools(), 3);
        let links = collect(&ctx, FixtureSite::new()).await;
        assert_eq!(links.len(), 3);
        assert_unique(&links);
    }

    #[tokio::test]
    async fn test_blocked_listing_switches_to_alternate() {
        let site = FixtureSite::new()
            .page(
                AZ_LISTING,
                "<html><head><title>Attention Required! | Cloudflare</title></head></html>",
            )
            .page(
                "https://www.azed.gov/edd/schools",
                r#"<a class="no-underline" href="https://azreportcards.azed.gov/schools/detail/77">Sunrise Elementary</a>"#,
            );

        let links = collect(&context(az_schools(), 50), site).await;

        assert_eq!(
            urls(&links),
            vec!["https://azreportcards.azed.gov/schools/detail/77"]
        );
    }

    fn tx_results(ids: &[(&str, &str)]) -> String {
        let rows: String = ids
            .iter()
            .map(|(id, name)| {
                format!(r#"<tr><td><a href="/schools/{id}/overview">{name}</a></td><td>Austin ISD</td></tr>"#)
            })
            .collect();
        format!(
            r#"<table><thead><tr><th>School Name</th><th>District</th></tr></thead><tbody>{rows}</tbody></table>"#
        )
    }

    #[tokio::test]
    async fn test_filters_applied_before_collecting() {
        let filtered = "https://txschools.gov/?view=schools&lng=en&grades=ee";
        let site = FixtureSite::new()
            .page(
                TX_LISTING,
                &format!(
                    r#"<label data-href="/?view=schools&lng=en&grades=ee">Early Education</label>
                       <a href="/find-a-school">Find a School</a>{}"#,
                    tx_results(&[("227901009", "Travis High School")])
                ),
            )
            .page(filtered, &tx_results(&[("227901001", "Lincoln Elementary")]));
        let ctx = context(tx_schools(), 50);
        let (mut nav, sleeper) = controller(site.clone());

        let links = LinkCollector::new(&ctx).collect(&mut nav).await.unwrap();

        // Only the filtered listing is harvested.
        assert_eq!(
            urls(&links),
            vec!["https://txschools.gov/schools/227901001/overview"]
        );
        assert_eq!(sleeper.of_kind(PauseKind::Settle).len(), 1);
        // Already on a results view, so the search step is skipped.
        assert_eq!(site.request_count("https://txschools.gov/find-a-school"), 0);
    }

    #[tokio::test]
    async fn test_search_step_opens_results_from_landing_page() {
        let landing = "https://txschools.gov/";
        let site = FixtureSite::new()
            .page(
                landing,
                r#"<h1>Texas Schools</h1><a class="btn-primary" href="/?view=schools&lng=en">Find a School</a>"#,
            )
            .page(TX_LISTING, &tx_results(&[("227901001", "Lincoln Elementary"), ("227901002", "Austin High School")]));
        let mut profile = tx_schools();
        profile.listing_url = landing.to_string();
        let ctx = context(profile, 50);
        let (mut nav, sleeper) = controller(site.clone());

        let links = LinkCollector::new(&ctx).collect(&mut nav).await.unwrap();

        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.source == LinkSource::Table));
        assert_eq!(site.request_count(TX_LISTING), 1);
        assert_eq!(sleeper.of_kind(PauseKind::Settle).len(), 1);
    }

    #[tokio::test]
    async fn test_zero_cap_collects_nothing() {
        let site = FixtureSite::new().page(AZ_LISTING, "<p>x</p>");
        assert!(collect(&context(az_schools(), 0), site.clone()).await.is_empty());
        assert!(site.requests().is_empty());
    }
}
