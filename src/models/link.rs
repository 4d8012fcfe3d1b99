//! Candidate detail-page links discovered on listing pages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a candidate link was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// A single "show all" control.
    Bulk,
    /// One key of an enumerated filter (e.g. a letter of the alphabet).
    Partition,
    /// A page of a paginated results table.
    Table,
    /// Keyword match over every anchor on the page.
    TextScan,
    /// Built-in known-good URL for the site.
    Seed,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Bulk => "bulk",
            LinkSource::Partition => "partition",
            LinkSource::Table => "table",
            LinkSource::TextScan => "text_scan",
            LinkSource::Seed => "seed",
        }
    }
}

impl fmt::Display for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL believed to point at a per-entity detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub url: String,
    /// Display name seen next to the link on the listing page.
    pub name_hint: Option<String>,
    pub source: LinkSource,
}

impl CandidateLink {
    pub fn new(url: impl Into<String>, source: LinkSource) -> Self {
        Self {
            url: url.into(),
            name_hint: None,
            source,
        }
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.name_hint = hint.map(|h| h.trim().to_string()).filter(|h| !h.is_empty());
        self
    }
}
