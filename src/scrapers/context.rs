//! Per-run context threaded through every pipeline component.

use regex::Regex;
use tracing::warn;

use super::sites::{self, SiteProfile, BUILTIN_SITES};
use crate::config::{Config, Settings, DEFAULT_MAX_PAGES, DEFAULT_MAX_RECORDS};
use crate::error::{Result, ScrapeError};
use crate::models::Field;
use crate::normalize::{AddressPattern, NameRules, DEFAULT_PHONE_PATTERN};

/// Everything a run needs, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub profile: SiteProfile,
    /// Splits address text into postal fields.
    pub address_pattern: AddressPattern,
    /// Finds address text in the page body. Falls back to `address_pattern`.
    pub address_body_pattern: Option<Regex>,
    pub phone_pattern: Regex,
    pub detail_pattern: Regex,
    pub name_rules: NameRules,
    /// Cap on collected links and on extracted records.
    pub max_records: usize,
    /// Cap on listing pages walked by the table scan.
    pub max_pages: usize,
    /// Export column order.
    pub data_fields: Vec<Field>,
    pub allow_seed_links: bool,
}

impl RunContext {
    /// Context for a profile with no configuration file values.
    pub fn new(profile: SiteProfile, settings: Settings) -> Result<Self> {
        let address_pattern = match &profile.address_pattern {
            Some(pattern) => AddressPattern::new(pattern, &profile.address_groups)?,
            None => AddressPattern::default(),
        };
        let detail_pattern = profile.detail_regex()?;

        Ok(Self {
            settings,
            address_pattern,
            address_body_pattern: None,
            phone_pattern: compile("phone", DEFAULT_PHONE_PATTERN)?,
            detail_pattern,
            name_rules: NameRules::default(),
            max_records: DEFAULT_MAX_RECORDS,
            max_pages: DEFAULT_MAX_PAGES,
            data_fields: Field::ALL.to_vec(),
            allow_seed_links: true,
            profile,
        })
    }

    /// Build the context for `site` from a loaded configuration.
    pub fn from_config(config: &Config, settings: Settings, site: &str) -> Result<Self> {
        let mut profile = sites::builtin(site).ok_or_else(|| {
            ScrapeError::Config(format!(
                "unknown site '{}' (available: {})",
                site,
                BUILTIN_SITES.join(", ")
            ))
        })?;
        profile.apply_config(config);

        if let Some(pattern) = config.get::<String>("patterns.address.pattern") {
            profile.address_pattern = Some(pattern);
            profile.address_groups = config
                .get::<Vec<String>>("patterns.address.groups")
                .unwrap_or_default();
        }

        let mut context = Self::new(profile, settings)?;

        if let Some(pattern) = config.get::<String>("patterns.address.body_pattern") {
            context.address_body_pattern = Some(compile("address body", &pattern)?);
        }
        if let Some(pattern) = config.get::<String>("patterns.phone.pattern") {
            context.phone_pattern = compile("phone", &pattern)?;
        }
        if let Some(max) = config.get::<usize>("max_schools") {
            context.max_records = max;
        }
        if let Some(max) = config.get::<usize>("max_pages") {
            context.max_pages = max.max(1);
        }
        if let Some(names) = config.get::<Vec<String>>("data_fields") {
            context.data_fields = parse_fields(&names);
        }
        if let Some(allow) = config.get::<bool>("allow_seed_links") {
            context.allow_seed_links = allow;
        }
        if let Some(deny) = config.get::<Vec<String>>("validation.deny") {
            context.name_rules.deny = deny;
        }
        if let Some(allow) = config.get::<Vec<String>>("validation.allow") {
            context.name_rules.allow = allow;
        }
        if let Some(len) = config.get::<usize>("validation.min_name_length") {
            context.name_rules.min_len = len;
        }
        if let Some(len) = config.get::<usize>("validation.max_name_length") {
            context.name_rules.max_len = len;
        }

        Ok(context)
    }

    pub fn site_id(&self) -> &str {
        &self.profile.id
    }

    /// First address-shaped substring of the page text.
    pub fn find_address<'t>(&self, text: &'t str) -> Option<&'t str> {
        match &self.address_body_pattern {
            Some(regex) => regex.find(text).map(|m| m.as_str()),
            None => self.address_pattern.find(text),
        }
    }

    /// First phone-shaped substring of the page text.
    pub fn find_phone<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.phone_pattern.find(text).map(|m| m.as_str())
    }
}

fn compile(what: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ScrapeError::Config(format!("invalid {} pattern '{}': {}", what, pattern, e)))
}

/// Map configured column names to fields, dropping unknown names and
/// duplicates. An empty result means every field.
fn parse_fields(names: &[String]) -> Vec<Field> {
    let mut fields = Vec::new();
    for name in names {
        match Field::from_name(name) {
            Some(field) if !fields.contains(&field) => fields.push(field),
            Some(_) => {}
            None => warn!("Ignoring unknown data field '{}'", name),
        }
    }
    if fields.is_empty() {
        Field::ALL.to_vec()
    } else {
        fields
    }
}
