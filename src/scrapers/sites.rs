//! Built-in site profiles.
//!
//! A profile is everything site-specific about a directory: where the
//! listing lives, which controls reveal the links, which links count as
//! detail pages and how each field is located on a detail page. The
//! pipeline itself is generic and only reads profiles.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::strategy::ExtractionStrategy;
use crate::browser::Query;
use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::models::Field;

/// Decides whether an href looks like a detail-page link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFilter {
    /// Case-insensitive substrings that disqualify a link.
    #[serde(default)]
    pub reject: Vec<String>,
    /// Substrings that qualify a link. Empty accepts anything not rejected.
    #[serde(default)]
    pub accept: Vec<String>,
    /// Also accept links with an all-digit path segment at least this long.
    #[serde(default)]
    pub numeric_segment: Option<usize>,
}

impl LinkFilter {
    pub fn rejects(&self, href: &str) -> bool {
        let href = href.trim();
        if href.is_empty() || href.ends_with('#') {
            return true;
        }
        let lower = href.to_ascii_lowercase();
        self.reject
            .iter()
            .any(|pattern| lower.contains(&pattern.to_ascii_lowercase()))
    }

    pub fn allows(&self, href: &str) -> bool {
        if self.rejects(href) {
            return false;
        }
        if self.accept.is_empty() && self.numeric_segment.is_none() {
            return true;
        }
        if self.accept.iter().any(|pattern| href.contains(pattern.as_str())) {
            return true;
        }
        match self.numeric_segment {
            Some(min) => href
                .split(['/', '?', '&', '='])
                .any(|segment| segment.len() >= min && segment.bytes().all(|b| b.is_ascii_digit())),
            None => false,
        }
    }
}

/// A control activated on the listing before any link is collected, such
/// as a search button or a filter checkbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareStep {
    pub label: String,
    /// Alternatives, tried in order; the first that matches is used.
    pub controls: Vec<Query>,
    /// How many matches of that control to click (e.g. two rating boxes).
    #[serde(default = "one")]
    pub clicks: usize,
    /// Skip the step when the current URL already contains one of these.
    #[serde(default)]
    pub skip_when_url_contains: Vec<String>,
}

impl PrepareStep {
    pub fn new(label: &str, controls: Vec<Query>) -> Self {
        Self {
            label: label.to_string(),
            controls,
            clicks: 1,
            skip_when_url_contains: Vec::new(),
        }
    }

    pub fn clicks(mut self, clicks: usize) -> Self {
        self.clicks = clicks;
        self
    }

    pub fn unless_url_contains(mut self, fragments: &[&str]) -> Self {
        self.skip_when_url_contains = strings(fragments);
        self
    }
}

fn one() -> usize {
    1
}

/// Everything the pipeline knows about one directory site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub id: String,
    pub display_name: String,
    pub listing_url: String,
    /// Listing to fall back to when the main one is behind a block page.
    #[serde(default)]
    pub alternate_listing_url: Option<String>,
    /// Title fragments that identify a block/challenge page.
    #[serde(default)]
    pub block_markers: Vec<String>,

    /// Overlays (cookie notices, dialogs) to dismiss before collecting.
    #[serde(default)]
    pub overlay_selectors: Vec<String>,
    /// Close controls looked up inside a visible overlay.
    #[serde(default)]
    pub overlay_close_selector: Option<String>,

    /// Search and filter controls applied before collection, in order.
    #[serde(default)]
    pub prepare_steps: Vec<PrepareStep>,
    /// "Show all" controls, tried in order.
    #[serde(default)]
    pub bulk_controls: Vec<Query>,
    /// Filter keys such as letters of the alphabet.
    #[serde(default)]
    pub partition_keys: Vec<String>,
    /// CSS templates for a partition control; `{key}` is substituted.
    #[serde(default)]
    pub partition_controls: Vec<String>,
    /// Anchor selectors for harvesting a listing page, most specific first.
    #[serde(default)]
    pub link_selectors: Vec<String>,
    /// Result table containers.
    #[serde(default)]
    pub table_selectors: Vec<String>,
    /// Header text (lowercase) that identifies the results table.
    #[serde(default)]
    pub table_header_keywords: Vec<String>,
    /// Field held by each results-table column. When set, a table without
    /// detail links is read row by row instead.
    #[serde(default)]
    pub table_columns: Vec<Field>,
    /// A row read from the table is kept only if its grades cell contains
    /// one of these (lowercase). Empty keeps every row.
    #[serde(default)]
    pub table_grade_keywords: Vec<String>,
    /// "Next page" controls, tried in order.
    #[serde(default)]
    pub next_controls: Vec<Query>,
    /// Anchor text keywords (lowercase) for the text scan.
    #[serde(default)]
    pub text_scan_keywords: Vec<String>,
    /// Anchor texts that are navigation, never entities.
    #[serde(default)]
    pub text_scan_ignore: Vec<String>,
    #[serde(default)]
    pub link_filter: LinkFilter,
    /// Known-good detail URLs used when discovery finds nothing.
    #[serde(default)]
    pub seed_urls: Vec<String>,

    /// Shape of a detail URL. Group 1 is the entity id; an optional group 2
    /// is a name slug.
    pub detail_url_pattern: String,
    /// Alternate detail URLs tried when a detail page is an error page;
    /// `{id}` is substituted.
    #[serde(default)]
    pub alternate_detail_urls: Vec<String>,
    /// Title fragments (lowercase) that identify an error page.
    #[serde(default)]
    pub error_title_markers: Vec<String>,
    /// Separators between the entity name and the site name in titles.
    #[serde(default)]
    pub title_delimiters: Vec<String>,
    /// Last-resort name built from the entity id; `{id}` is substituted.
    #[serde(default)]
    pub name_from_id: Option<String>,

    #[serde(default)]
    pub address_pattern: Option<String>,
    #[serde(default)]
    pub address_groups: Vec<String>,
    /// Region filled in when an address is found without one.
    #[serde(default)]
    pub default_region: Option<String>,
    /// Website links pointing at these hosts are not the entity's website.
    #[serde(default)]
    pub excluded_website_domains: Vec<String>,
    /// Ordered strategies per field.
    #[serde(default)]
    pub strategies: BTreeMap<Field, Vec<ExtractionStrategy>>,
}

impl SiteProfile {
    pub fn strategies_for(&self, field: Field) -> &[ExtractionStrategy] {
        self.strategies
            .get(&field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn detail_regex(&self) -> Result<Regex> {
        Regex::new(&self.detail_url_pattern).map_err(|e| {
            ScrapeError::Config(format!(
                "invalid detail URL pattern '{}': {}",
                self.detail_url_pattern, e
            ))
        })
    }

    /// Overlay values from a configuration file onto the built-in profile.
    pub fn apply_config(&mut self, config: &Config) {
        if let Some(url) = config.get::<String>("base_url").filter(|u| !u.trim().is_empty()) {
            self.listing_url = url;
        }
        if let Some(url) = config.get::<String>("alternate_url") {
            self.alternate_listing_url = Some(url);
        }
        if let Some(seeds) = config.get::<Vec<String>>("seed_urls") {
            self.seed_urls = seeds;
        }
        if let Some(pattern) = config.get::<String>("detail_url_pattern") {
            self.detail_url_pattern = pattern;
        }
        if let Some(region) = config.get::<String>("default_region") {
            self.default_region = Some(region);
        }
        if let Some(filter) = config.get::<LinkFilter>("link_filter") {
            self.link_filter = filter;
        }
        if let Some(keys) = config.get::<Vec<String>>("partition_keys") {
            self.partition_keys = keys;
        }
        for field in Field::ALL {
            let key = format!("strategies.{}", field.as_str());
            if let Some(strategies) = config.get::<Vec<ExtractionStrategy>>(&key) {
                self.strategies.insert(field, strategies);
            }
        }
    }
}

/// Ids of the built-in profiles.
pub const BUILTIN_SITES: &[&str] = &["tx_schools", "az_schools"];

/// Look up a built-in profile by id.
pub fn builtin(id: &str) -> Option<SiteProfile> {
    match id.trim().to_ascii_lowercase().as_str() {
        "tx_schools" | "tx" => Some(tx_schools()),
        "az_schools" | "az" => Some(az_schools()),
        _ => None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const COMMON_OVERLAYS: &[&str] = &[
    ".v-overlay--active",
    ".modal-active",
    ".popup-container",
    ".cookie-notice",
    ".v-dialog--active",
    "div[role='dialog']",
];

const ENTITY_KEYWORDS: &[&str] = &[
    "elementary",
    "middle",
    "high school",
    "academy",
    "school",
    "charter",
    "education",
];

/// Texas public school directory (txschools.gov).
pub fn tx_schools() -> SiteProfile {
    let mut strategies = BTreeMap::new();
    strategies.insert(
        Field::Name,
        vec![
            ExtractionStrategy::css("h1.school-header-title"),
            ExtractionStrategy::css("h1.campus-name"),
            ExtractionStrategy::css("h1.campus-title"),
            ExtractionStrategy::css("h1").first_line(),
            ExtractionStrategy::css("div.school-name"),
            ExtractionStrategy::css("div.campus-name"),
            ExtractionStrategy::css(".MuiTypography-h4"),
            ExtractionStrategy::css(".header-title"),
            ExtractionStrategy::css(".campus-detail-header"),
        ],
    );
    strategies.insert(
        Field::AddressLine1,
        vec![
            ExtractionStrategy::following("div", "Address:"),
            ExtractionStrategy::following("strong", "Address:"),
            ExtractionStrategy::following("span", "Address"),
            ExtractionStrategy::css(".address-container").strip_label("Address:"),
        ],
    );
    strategies.insert(
        Field::ParentOrganization,
        vec![
            ExtractionStrategy::css(".district-name"),
            ExtractionStrategy::following("div", "District:"),
            ExtractionStrategy::following("span", "District"),
            ExtractionStrategy::css(".district-info").strip_label("District:"),
        ],
    );
    strategies.insert(
        Field::Phone,
        vec![
            ExtractionStrategy::css("a[href^='tel:']"),
            ExtractionStrategy::css("div.phone").strip_label("Phone:"),
            ExtractionStrategy::css("span.phone").strip_label("Phone:"),
            ExtractionStrategy::following("div", "Phone:"),
            ExtractionStrategy::following("strong", "Phone:"),
            ExtractionStrategy::following("span", "Phone"),
            ExtractionStrategy::css(".phone-container").strip_label("Phone:"),
        ],
    );
    strategies.insert(
        Field::Website,
        vec![
            ExtractionStrategy::contains("a", "SCHOOL WEBSITE").attribute("href"),
            ExtractionStrategy::css(".MuiGrid-root a[href^='http']").attribute("href"),
            ExtractionStrategy::css("a.school-website").attribute("href"),
            ExtractionStrategy::css("a.website-link").attribute("href"),
            ExtractionStrategy::contains("a", "Website").attribute("href"),
            ExtractionStrategy::contains("a", "website").attribute("href"),
        ],
    );
    strategies.insert(
        Field::GradesServed,
        vec![
            ExtractionStrategy::css(".grades-served").strip_label("Grades Served:"),
            ExtractionStrategy::following("div", "Grades Served:"),
            ExtractionStrategy::following("span", "Grades"),
            ExtractionStrategy::css(".grades-info").strip_label("Grades"),
        ],
    );

    SiteProfile {
        id: "tx_schools".to_string(),
        display_name: "Texas Schools (txschools.gov)".to_string(),
        listing_url: "https://txschools.gov/?view=schools&lng=en".to_string(),
        alternate_listing_url: None,
        block_markers: strings(&["Cloudflare", "Attention Required", "Access denied"]),
        overlay_selectors: strings(COMMON_OVERLAYS),
        overlay_close_selector: Some(
            "button.close, button[aria-label='Close'], button.v-dialog__close".to_string(),
        ),
        prepare_steps: vec![
            PrepareStep::new(
                "filter panel",
                vec![
                    Query::css("button[aria-label='filter']"),
                    Query::css("[data-testid='FilterListIcon']"),
                    Query::css("div.filter-button button"),
                    Query::css("button.filter-button"),
                    Query::contains("button", "Filter"),
                ],
            ),
            PrepareStep::new(
                "Early Education",
                vec![
                    Query::contains("label", "Early Education"),
                    Query::css("input[type='checkbox'][name*='Early']"),
                    Query::css("[data-testid='early-education-checkbox']"),
                ],
            ),
            PrepareStep::new(
                "Prekindergarten",
                vec![
                    Query::contains("label", "Prekindergarten"),
                    Query::contains("label", "Pre-K"),
                    Query::css("input[type='checkbox'][name*='Pre']"),
                    Query::css("[data-testid='prekindergarten-checkbox']"),
                ],
            ),
            PrepareStep::new(
                "Kindergarten",
                vec![
                    Query::contains("label", "Kindergarten"),
                    Query::css("input[type='checkbox'][name*='Kinder']"),
                    Query::css("[data-testid='kindergarten-checkbox']"),
                ],
            ),
            PrepareStep::new(
                "school rating",
                vec![Query::css("input[type='checkbox'][name='School Rating']")],
            )
            .clicks(2),
            PrepareStep::new(
                "Find a School",
                vec![
                    Query::css("a[href*='find-a-school']"),
                    Query::contains("a", "Find a School"),
                ],
            )
            .unless_url_contains(&["view=schools", "?schools"]),
        ],
        bulk_controls: Vec::new(),
        partition_keys: Vec::new(),
        partition_controls: Vec::new(),
        link_selectors: strings(&[
            "a[href*='/schools/']",
            "a[href*='/campus/']",
            ".MuiCard-root a",
        ]),
        table_selectors: strings(&[
            ".MuiTableContainer-root table",
            ".MuiTable-root",
            "table",
            "div[role='grid']",
        ]),
        table_header_keywords: strings(&["school name", "district", "address"]),
        table_columns: vec![
            Field::Name,
            Field::ParentOrganization,
            Field::AddressLine1,
            Field::GradesServed,
        ],
        table_grade_keywords: strings(&["early", "pre", "kinder", "kg", "k-"]),
        next_controls: vec![
            Query::css("button[aria-label='next page']"),
            Query::css("button[aria-label='Next Page']"),
            Query::css("button[aria-label*='next' i]"),
            Query::css("li.pagination-next > button"),
            Query::css("li.pagination-next > a"),
            Query::css("a.next-page"),
            Query::css("a.pagination-next"),
        ],
        text_scan_keywords: strings(ENTITY_KEYWORDS),
        text_scan_ignore: Vec::new(),
        link_filter: LinkFilter {
            reject: strings(&[
                "/search",
                "/login",
                "/about",
                "/faq",
                "/help",
                "/contact",
                "javascript:",
                "tel:",
                "mailto:",
                "sitemap",
                "policy",
                "manual",
                "accountability",
                "welcome",
                "/tea/",
                "workarea",
                "interiorpage.aspx",
                "complaints",
                "fraud",
            ]),
            accept: strings(&["/schools/", "/campus/", "/school/", "campusreport"]),
            numeric_segment: Some(6),
        },
        seed_urls: Vec::new(),
        detail_url_pattern: r"txschools\.gov/schools/(\d{9})/\w+".to_string(),
        alternate_detail_urls: strings(&[
            "https://txschools.gov/schools/campus/{id}",
            "https://rptsvr1.tea.texas.gov/perfreport/tapr/2022/campus.srch.html?campnum={id}",
        ]),
        error_title_markers: strings(&["not found", "error", "404"]),
        title_delimiters: strings(&[" | "]),
        name_from_id: None,
        address_pattern: Some(
            r"([^,\n]+),\s*([^,\n]+),\s*(TX\s+\d{5}(?:-\d{4})?)".to_string(),
        ),
        address_groups: strings(&["address_line1", "city", "region_postal"]),
        default_region: Some("TX".to_string()),
        excluded_website_domains: strings(&["txschools.gov", "tea.texas.gov"]),
        strategies,
    }
}

/// Arizona school report cards (azreportcards.azed.gov).
pub fn az_schools() -> SiteProfile {
    let mut strategies = BTreeMap::new();
    strategies.insert(
        Field::Name,
        vec![
            ExtractionStrategy::css("p.entity_name.body-2.primary-text"),
            ExtractionStrategy::css("p.text-xs-center"),
            ExtractionStrategy::css("h1").first_line(),
            ExtractionStrategy::css(".school-header h1"),
            ExtractionStrategy::css("div.school-header").first_line(),
        ],
    );
    strategies.insert(
        Field::ParentOrganization,
        vec![
            ExtractionStrategy::css("span.title").require_any(&["District", "USD", "Unified"]),
            ExtractionStrategy::css(".district-info p")
                .require_any(&["District", "USD", "Unified"]),
            ExtractionStrategy::css("p.subtitle").require_any(&["District", "USD", "Unified"]),
        ],
    );
    strategies.insert(
        Field::AddressLine1,
        vec![
            ExtractionStrategy::following("h3", "Contact Information").max_len(400),
            ExtractionStrategy::css(".contact-info"),
        ],
    );
    strategies.insert(
        Field::Phone,
        vec![
            ExtractionStrategy::css("a[href^='tel:']"),
            ExtractionStrategy::following("div", "Phone"),
        ],
    );
    strategies.insert(
        Field::Website,
        vec![
            ExtractionStrategy::css("a[href^='http']").attribute("href"),
            ExtractionStrategy::contains("a", "Website").attribute("href"),
            ExtractionStrategy::contains("a", "website").attribute("href"),
            ExtractionStrategy::contains("a", "School Website").attribute("href"),
        ],
    );
    strategies.insert(
        Field::GradesServed,
        vec![
            ExtractionStrategy::following("div", "Grades").strip_label("Grades"),
            ExtractionStrategy::following("span", "Grades").strip_label("Grades"),
            ExtractionStrategy::contains("p", "Grades").strip_label("Grades"),
        ],
    );

    let letters: Vec<String> = ('A'..='Z').map(|c| c.to_string()).collect();
    let mut ignore = letters.clone();
    ignore.push("ALL".to_string());

    SiteProfile {
        id: "az_schools".to_string(),
        display_name: "Arizona School Report Cards (azreportcards.azed.gov)".to_string(),
        listing_url: "https://azreportcards.azed.gov/schools".to_string(),
        alternate_listing_url: Some("https://www.azed.gov/edd/schools".to_string()),
        block_markers: strings(&["Cloudflare", "Attention Required"]),
        overlay_selectors: strings(COMMON_OVERLAYS),
        overlay_close_selector: Some(
            "button.close, button[aria-label='Close'], .v-btn--icon, button.v-dialog__close"
                .to_string(),
        ),
        prepare_steps: Vec::new(),
        bulk_controls: vec![Query::css("button[value='ALL']")],
        partition_keys: letters,
        partition_controls: strings(&[
            "button[value='{key}']",
            "button.v-btn[value='{key}']",
            "button.v-btn--small[value='{key}']",
            "a[data-letter='{key}']",
        ]),
        link_selectors: strings(&[
            "a.no-underline",
            "a[href*='/schools/detail/']",
            "p.entity_name.body-2.primary-text a",
            "div.flex.dflex.xs12.sm6.md4 a",
            "div.layout.row.wrap a",
        ]),
        table_selectors: strings(&["table", "div[role='grid']"]),
        table_header_keywords: strings(&["school name", "school", "district", "address"]),
        table_columns: Vec::new(),
        table_grade_keywords: Vec::new(),
        next_controls: vec![
            Query::css("button[aria-label*='next' i]"),
            Query::contains("button", "Next"),
        ],
        text_scan_keywords: strings(ENTITY_KEYWORDS),
        text_scan_ignore: ignore,
        link_filter: LinkFilter {
            reject: strings(&["javascript:", "mailto:", "tel:", "/search", "sitemap"]),
            accept: strings(&["/schools/detail/"]),
            numeric_segment: None,
        },
        seed_urls: ["5958", "1000972", "5768", "4276", "4285", "4287"]
            .iter()
            .map(|id| format!("https://azreportcards.azed.gov/schools/detail/{}", id))
            .collect(),
        detail_url_pattern: r"/schools/detail/(\d+)(?:/([^/?#]+))?".to_string(),
        alternate_detail_urls: Vec::new(),
        error_title_markers: strings(&["not found", "error", "404"]),
        title_delimiters: strings(&[" | ", " - "]),
        name_from_id: None,
        address_pattern: Some(
            r"([^,\n]+),\s*([^,\n]+),\s*(AZ\s+\d{5}(?:-\d{4})?)".to_string(),
        ),
        address_groups: strings(&["address_line1", "city", "region_postal"]),
        default_region: Some("AZ".to_string()),
        excluded_website_domains: strings(&["azreportcards.azed.gov", "azed.gov"]),
        strategies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("tx_schools").map(|p| p.id), Some("tx_schools".to_string()));
        assert_eq!(builtin("AZ").map(|p| p.id), Some("az_schools".to_string()));
        assert!(builtin("nm_schools").is_none());
        for id in BUILTIN_SITES {
            let profile = builtin(id).unwrap();
            assert!(profile.detail_regex().is_ok());
            assert!(!profile.strategies_for(Field::Name).is_empty());
        }
    }

    #[test]
    fn test_tx_link_filter() {
        let filter = tx_schools().link_filter;
        assert!(filter.allows("https://txschools.gov/schools/057910001/overview"));
        assert!(filter.allows("https://example.org/x/101912/"));
        assert!(!filter.allows("https://txschools.gov/search?q=austin"));
        assert!(!filter.allows("mailto:help@tea.texas.gov"));
        assert!(!filter.allows("https://txschools.gov/about"));
        assert!(!filter.allows("https://txschools.gov/schools/#"));
    }

    #[test]
    fn test_az_detail_pattern_captures_id_and_slug() {
        let regex = az_schools().detail_regex().unwrap();
        let caps = regex
            .captures("https://azreportcards.azed.gov/schools/detail/5958/a-j-mitchell-elementary")
            .unwrap();
        assert_eq!(&caps[1], "5958");
        assert_eq!(caps.get(2).map(|m| m.as_str()), Some("a-j-mitchell-elementary"));
        assert!(regex.captures("https://azreportcards.azed.gov/schools").is_none());
    }

    #[test]
    fn test_az_seeds_are_detail_urls() {
        let profile = az_schools();
        let regex = profile.detail_regex().unwrap();
        assert_eq!(profile.seed_urls.len(), 6);
        assert!(profile.seed_urls.iter().all(|u| regex.is_match(u)));
    }

    #[test]
    fn test_prepare_step_from_yaml() {
        let step: PrepareStep = serde_yaml::from_str(
            r#"
label: search
controls:
  - css: "a.find"
  - contains: { tag: a, text: "Find a School" }
skip_when_url_contains: ["view=schools"]
"#,
        )
        .unwrap();
        assert_eq!(step.clicks, 1);
        assert_eq!(
            step,
            PrepareStep::new(
                "search",
                vec![Query::css("a.find"), Query::contains("a", "Find a School")]
            )
            .unless_url_contains(&["view=schools"])
        );
    }

    #[test]
    fn test_config_overlays_profile() {
        let config = Config::from_yaml_str(
            r#"
base_url: "https://example.org/directory"
seed_urls: ["https://example.org/schools/detail/1"]
strategies:
  name:
    - css: "h2.title"
"#,
        )
        .unwrap();
        let mut profile = az_schools();
        profile.apply_config(&config);

        assert_eq!(profile.listing_url, "https://example.org/directory");
        assert_eq!(profile.seed_urls.len(), 1);
        assert_eq!(
            profile.strategies_for(Field::Name),
            &[ExtractionStrategy::css("h2.title")]
        );
        // Untouched fields keep the built-in strategies.
        assert!(!profile.strategies_for(Field::Website).is_empty());
    }
}
