//! Pure normalizers and validators for extracted text.
//!
//! Nothing in here fails on odd input: unparseable text degrades to a
//! best-effort value (the raw text in `address_line1`, the trimmed original
//! phone string) rather than an error.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::models::{Field, Record};

/// US-style `street, city, ST 12345` with an optional second address line.
pub const DEFAULT_ADDRESS_PATTERN: &str =
    r"([^,\n]+?),\s*(?:([^,\n]+?),\s*)??([^,\n]+?),\s*([A-Z]{2}\s+\d{5}(?:-\d{4})?)";

/// Loose North American phone shape used to find numbers in page text.
pub const DEFAULT_PHONE_PATTERN: &str = r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}";

/// Structured postal fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
}

impl AddressParts {
    pub fn is_empty(&self) -> bool {
        self.address_line1.is_empty() && self.city.is_empty() && self.postal_code.is_empty()
    }

    /// True when the text was split into components rather than dumped
    /// into `address_line1`.
    pub fn is_structured(&self) -> bool {
        !self.city.is_empty() || !self.region.is_empty() || !self.postal_code.is_empty()
    }

    /// Copy non-empty parts into a record, never overwriting existing values.
    pub fn apply_to(&self, record: &mut Record) {
        record.set_if_absent(Field::AddressLine1, self.address_line1.as_str());
        record.set_if_absent(Field::AddressLine2, self.address_line2.as_str());
        record.set_if_absent(Field::City, self.city.as_str());
        record.set_if_absent(Field::Region, self.region.as_str());
        record.set_if_absent(Field::PostalCode, self.postal_code.as_str());
    }

    fn assign(&mut self, slot: Slot, value: &str) {
        let value = value.trim();
        match slot {
            Slot::Line1 => self.address_line1 = value.to_string(),
            Slot::Line2 => self.address_line2 = value.to_string(),
            Slot::City => self.city = value.to_string(),
            Slot::Region => self.region = value.to_string(),
            Slot::Postal => self.postal_code = value.to_string(),
            Slot::RegionPostal => {
                let mut parts = value.split_whitespace();
                self.region = parts.next().unwrap_or("").to_string();
                self.postal_code = parts.collect::<Vec<_>>().join(" ");
            }
            Slot::Ignored => {}
        }
    }
}

/// Where one capture group of the address pattern lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Line1,
    Line2,
    City,
    Region,
    Postal,
    /// `"TX 78701"`, split on whitespace.
    RegionPostal,
    Ignored,
}

impl Slot {
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "region_postal" | "state_zip" | "region_postal_code" => Slot::RegionPostal,
            other => match Field::from_name(other) {
                Some(Field::AddressLine1) => Slot::Line1,
                Some(Field::AddressLine2) => Slot::Line2,
                Some(Field::City) => Slot::City,
                Some(Field::Region) => Slot::Region,
                Some(Field::PostalCode) => Slot::Postal,
                _ => Slot::Ignored,
            },
        }
    }
}

/// A configured address regex and the meaning of its capture groups.
///
/// Groups are mapped positionally from `groups`; a pattern that uses named
/// captures (`(?P<city>...)`) needs no group list.
#[derive(Debug, Clone)]
pub struct AddressPattern {
    regex: Regex,
    slots: Vec<Slot>,
}

impl AddressPattern {
    pub fn new(pattern: &str, groups: &[String]) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            ScrapeError::Config(format!("invalid address pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            regex,
            slots: groups.iter().map(|g| Slot::from_name(g)).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// The first substring of `text` shaped like an address.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex.find(text).map(|m| m.as_str())
    }

    fn parse(&self, text: &str) -> Option<AddressParts> {
        let captures = self.regex.captures(text)?;
        let mut parts = AddressParts::default();

        for (name, slot) in self
            .regex
            .capture_names()
            .flatten()
            .map(|name| (name, Slot::from_name(name)))
        {
            if let Some(m) = captures.name(name) {
                parts.assign(slot, m.as_str());
            }
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(m) = captures.get(index + 1) {
                parts.assign(*slot, m.as_str());
            }
        }
        Some(parts)
    }
}

static DEFAULT_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_ADDRESS_PATTERN).unwrap());

impl Default for AddressPattern {
    fn default() -> Self {
        Self {
            regex: DEFAULT_ADDRESS_RE.clone(),
            slots: vec![Slot::Line1, Slot::Line2, Slot::City, Slot::RegionPostal],
        }
    }
}

/// Split free address text into postal fields.
///
/// When the pattern does not match, the whole (trimmed) text goes into
/// `address_line1` and every other field stays empty.
pub fn normalize_address(raw: &str, pattern: &AddressPattern) -> AddressParts {
    let text = raw.trim();
    if text.is_empty() {
        return AddressParts::default();
    }
    // Line breaks inside a block of address text act as separators.
    let flattened = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    match pattern.parse(&flattened) {
        Some(parts) if !parts.address_line1.is_empty() || parts.is_structured() => parts,
        _ => AddressParts {
            address_line1: text.to_string(),
            ..Default::default()
        },
    }
}

/// Trailing extension such as `ext 2`, `x204` or `#12`.
static EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:,|;)?\s*(?:ext\.?|extension|x|#)\s*\d{1,6}\s*$").unwrap()
});

/// Format a phone number as `(AAA) BBB-CCCC`.
///
/// A trailing extension is dropped before counting digits. Anything that
/// does not reduce to exactly ten digits, including numbers written with a
/// country code, is returned trimmed but otherwise untouched.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let number = EXTENSION_RE.replace(trimmed, "");
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();

    if digits.len() == 10 {
        format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
    } else {
        trimmed.to_string()
    }
}

/// Query parameters that carry the location text in map-service links.
const MAP_QUERY_KEYS: &[&str] = &["q", "query", "daddr", "destination", "address"];

/// Hosts treated as map services.
pub const MAP_HOST_MARKERS: &[&str] = &["maps.google.", "google.com/maps", "goo.gl/maps", "maps.apple.com", "bing.com/maps"];

pub fn is_map_link(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    MAP_HOST_MARKERS.iter().any(|m| lower.contains(m))
}

/// Recover address fields from a map-service link's location parameter.
///
/// Expects `street, city, REGION POSTAL` and keeps whatever prefix of that
/// shape is present. A fourth comma part that looks like a ZIP+4 suffix
/// (`-1234`) is appended to the postal code.
pub fn parse_map_link(url: &str) -> AddressParts {
    let Some(location) = map_location(url) else {
        return AddressParts::default();
    };

    let parts: Vec<&str> = location
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let mut address = AddressParts::default();

    if let Some(street) = parts.first() {
        address.address_line1 = street.to_string();
    }
    if let Some(city) = parts.get(1) {
        address.city = city.to_string();
    }
    if let Some(region_postal) = parts.get(2) {
        address.assign(Slot::RegionPostal, region_postal);
        if let Some(suffix) = parts.get(3).filter(|s| s.starts_with('-')) {
            address.postal_code.push_str(suffix);
        }
    }
    address
}

fn map_location(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let from_query = parsed
        .query_pairs()
        .find(|(key, value)| MAP_QUERY_KEYS.contains(&key.as_ref()) && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string());
    if from_query.is_some() {
        return from_query;
    }

    // google.com/maps/place/<address>/...
    let mut segments = parsed.path_segments()?;
    segments.find(|s| *s == "place")?;
    let place = segments.next()?;
    let decoded = urlencoding::decode(place).ok()?;
    let location = decoded.replace('+', " ");
    Some(location.trim().to_string()).filter(|l| !l.is_empty())
}

/// Name validity rules.
#[derive(Debug, Clone)]
pub struct NameRules {
    pub min_len: usize,
    pub max_len: usize,
    /// Case-sensitive substrings that mark a non-entity string.
    pub deny: Vec<String>,
    /// Substrings that mark an entity name regardless of length.
    pub allow: Vec<String>,
}

impl Default for NameRules {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            min_len: 3,
            max_len: 50,
            deny: list(&[
                "Manual",
                "Policy",
                "Policies",
                "Sitemap",
                "Report Card",
                "Welcome",
                "Overview",
                "Search",
                "Texas Education Agency",
                "Contact",
                "Privacy",
                "Login",
                "Accessibility",
                "Page Not Found",
            ]),
            allow: list(&[
                "School",
                "Elementary",
                "Middle",
                "High",
                "Academy",
                "ISD",
                "Institute",
                "College",
                "Junior",
                "Campus",
                "District",
                "Charter",
                "Preparatory",
            ]),
        }
    }
}

impl NameRules {
    /// Check a candidate record name.
    ///
    /// Too-short text and text containing a denied keyword are rejected.
    /// Text containing an allowed keyword is accepted. Anything else is
    /// accepted unless it exceeds `max_len`.
    pub fn is_valid(&self, text: &str) -> bool {
        let text = text.trim();
        if text.chars().count() < self.min_len {
            return false;
        }
        if self.deny.iter().any(|d| text.contains(d.as_str())) {
            return false;
        }
        if self.allow.iter().any(|a| text.contains(a.as_str())) {
            return true;
        }
        text.chars().count() <= self.max_len
    }
}

/// [`NameRules::is_valid`] with the default rules.
pub fn is_valid_name(text: &str) -> bool {
    NameRules::default().is_valid(text)
}

/// Normalize a website URL: add a scheme when missing, drop a trailing
/// slash and any fragment. Non-web links (`mailto:`, `tel:`,
/// `javascript:`) normalize to `None`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if ["mailto:", "tel:", "javascript:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }

    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    };
    let mut url = Url::parse(&with_scheme).ok()?;
    url.host_str()?;
    url.set_fragment(None);

    let mut normalized = url.to_string();
    if url.query().is_none() {
        while normalized.ends_with('/') {
            normalized.pop();
        }
    }
    Some(normalized)
}

/// Turn a URL slug such as `desert-view-high-school` into a display name.
pub fn title_from_slug(slug: &str) -> String {
    let decoded = urlencoding::decode(slug)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| slug.to_string());
    decoded
        .split(|c: char| c == '-' || c == '_' || c == '+' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip the site suffix from a page title (`"Lincoln Elementary | TXSchools"`).
pub fn clean_title(title: &str, delimiters: &[String]) -> String {
    let mut cleaned = title.trim();
    for delimiter in delimiters {
        if let Some((head, _)) = cleaned.split_once(delimiter.as_str()) {
            cleaned = head.trim();
        }
    }
    cleaned.to_string()
}
