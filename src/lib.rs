//! dirscrape: resilient extraction of facility records from public
//! institutional directory websites.
//!
//! A run opens a site's listing page, collects candidate detail-page links
//! through a sequence of fallback strategies, extracts each detail page with
//! ordered per-field selector strategies, normalizes addresses and phone
//! numbers, and exports the validated records.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod normalize;
pub mod scrapers;

pub use config::{Config, Settings};
pub use error::{BrowserError, Result, ScrapeError};
pub use models::{CandidateLink, Field, LinkSource, Record};
