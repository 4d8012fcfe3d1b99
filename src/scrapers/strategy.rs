//! Ordered extraction strategies and the executor that evaluates them.
//!
//! A field's strategies are tried in declaration order and the first one
//! that produces a usable value from a visible element wins. Nothing here
//! returns an error: a strategy that matches nothing, fails to evaluate, or
//! yields only filtered-out text simply passes control to the next one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::navigation::NavigationController;
use crate::browser::{ElementSnapshot, Query, Scope};

/// What a strategy looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyQuery {
    /// CSS selector.
    Css(String),
    /// Element of `tag` whose own text contains `text`.
    Contains { tag: String, text: String },
    /// Next sibling of such a label element.
    Following { tag: String, text: String },
    /// Regex over the rendered page text.
    Pattern(String),
}

impl StrategyQuery {
    /// The structural query, or `None` for text patterns.
    pub fn to_query(&self) -> Option<Query> {
        match self {
            StrategyQuery::Css(css) => Some(Query::css(css.as_str())),
            StrategyQuery::Contains { tag, text } => Some(Query::contains(tag.as_str(), text.as_str())),
            StrategyQuery::Following { tag, text } => {
                Some(Query::following(tag.as_str(), text.as_str()))
            }
            StrategyQuery::Pattern(_) => None,
        }
    }
}

/// One candidate way of locating a field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStrategy {
    #[serde(flatten)]
    pub query: StrategyQuery,
    /// Read this attribute instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Labels to cut off: the value is what follows the first label found.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strip_labels: Vec<String>,
    /// Keep only the first non-empty line.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub first_line: bool,
    /// The value must contain one of these (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require_any: Vec<String>,
    /// The value must contain none of these (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject_any: Vec<String>,
    /// Capture group for `pattern` strategies; defaults to 1, or the whole
    /// match when the pattern has no groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

impl ExtractionStrategy {
    fn with_query(query: StrategyQuery) -> Self {
        Self {
            query,
            attribute: None,
            strip_labels: Vec::new(),
            first_line: false,
            require_any: Vec::new(),
            reject_any: Vec::new(),
            group: None,
            max_len: None,
        }
    }

    pub fn css(selector: &str) -> Self {
        Self::with_query(StrategyQuery::Css(selector.to_string()))
    }

    pub fn contains(tag: &str, text: &str) -> Self {
        Self::with_query(StrategyQuery::Contains {
            tag: tag.to_string(),
            text: text.to_string(),
        })
    }

    pub fn following(tag: &str, text: &str) -> Self {
        Self::with_query(StrategyQuery::Following {
            tag: tag.to_string(),
            text: text.to_string(),
        })
    }

    pub fn pattern(regex: &str) -> Self {
        Self::with_query(StrategyQuery::Pattern(regex.to_string()))
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.attribute = Some(name.to_string());
        self
    }

    pub fn strip_label(mut self, label: &str) -> Self {
        self.strip_labels.push(label.to_string());
        self
    }

    pub fn first_line(mut self) -> Self {
        self.first_line = true;
        self
    }

    pub fn require_any(mut self, needles: &[&str]) -> Self {
        self.require_any.extend(needles.iter().map(|s| s.to_string()));
        self
    }

    pub fn reject_any(mut self, needles: &[&str]) -> Self {
        self.reject_any.extend(needles.iter().map(|s| s.to_string()));
        self
    }

    pub fn group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Apply the post-processing rules to one raw value.
    pub fn post_process(&self, raw: &str) -> Option<String> {
        let mut value = raw.trim();

        if self.first_line {
            value = value.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        }
        for label in &self.strip_labels {
            if let Some((_, rest)) = value.split_once(label.as_str()) {
                value = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
                break;
            }
        }
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let lower = value.to_lowercase();
        if !self.require_any.is_empty()
            && !self
                .require_any
                .iter()
                .any(|n| lower.contains(&n.to_lowercase()))
        {
            return None;
        }
        if self
            .reject_any
            .iter()
            .any(|n| lower.contains(&n.to_lowercase()))
        {
            return None;
        }
        if self.max_len.is_some_and(|max| value.chars().count() > max) {
            return None;
        }
        Some(value.to_string())
    }

    fn element_value(&self, element: &ElementSnapshot) -> Option<String> {
        let raw = match &self.attribute {
            Some(name) if name == "href" => element.href()?,
            Some(name) => element.attr(name)?,
            None => element.text.as_str(),
        };
        self.post_process(raw)
    }

    fn pattern_values(&self, regex: &str, text: &str) -> Vec<String> {
        let regex = match Regex::new(regex) {
            Ok(regex) => regex,
            Err(e) => {
                debug!("Skipping invalid pattern '{}': {}", regex, e);
                return Vec::new();
            }
        };
        let group = self
            .group
            .unwrap_or(if regex.captures_len() > 1 { 1 } else { 0 });
        regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(group))
            .filter_map(|m| self.post_process(m.as_str()))
            .collect()
    }
}

/// Resolve a field: the first strategy with a visible, accepted match wins.
pub async fn resolve(
    nav: &mut NavigationController,
    strategies: &[ExtractionStrategy],
    scope: Scope<'_>,
) -> Option<String> {
    resolve_with(nav, strategies, scope, |value| Some(value.to_string())).await
}

/// [`resolve`] with a conversion step. A value that `accept` turns into
/// `None` is treated like a miss, and evaluation continues with the next
/// matching element and then the next strategy.
pub async fn resolve_with<T, F>(
    nav: &mut NavigationController,
    strategies: &[ExtractionStrategy],
    scope: Scope<'_>,
    mut accept: F,
) -> Option<T>
where
    F: FnMut(&str) -> Option<T> + Send,
    T: Send,
{
    for (index, strategy) in strategies.iter().enumerate() {
        let candidates = match &strategy.query {
            StrategyQuery::Pattern(regex) => {
                let text = match scope {
                    Scope::Document => nav.body_text().await,
                    Scope::Within(element) => element.text.clone(),
                };
                strategy.pattern_values(regex, &text)
            }
            other => {
                let Some(query) = other.to_query() else {
                    continue;
                };
                nav.find_visible(&query, scope)
                    .await
                    .iter()
                    .filter_map(|element| strategy.element_value(element))
                    .collect()
            }
        };

        if let Some(found) = candidates.iter().find_map(|value| accept(value.as_str())) {
            debug!("Strategy {} ({:?}) matched", index, strategy.query);
            return Some(found);
        }
        debug!("Strategy {} ({:?}) found nothing", index, strategy.query);
    }
    None
}
