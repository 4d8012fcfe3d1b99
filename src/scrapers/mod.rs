//! The extraction pipeline: navigation, link collection and detail extraction.

pub mod context;
pub mod detail;
pub mod links;
pub mod navigation;
pub mod pacing;
pub mod pipeline;
pub mod rows;
pub mod sites;
pub mod strategy;

pub use context::RunContext;
pub use detail::{DetailExtractor, DetailOutcome};
pub use links::{LinkCollector, LinkSet};
pub use navigation::{NavigationController, NavigationPolicy, PageContext};
pub use pacing::{backoff_delay, PauseKind, RecordingSleeper, Sleeper, TokioSleeper};
pub use pipeline::{run, RunReport};
pub use rows::TableReader;
pub use sites::{LinkFilter, PrepareStep, SiteProfile, BUILTIN_SITES};
pub use strategy::{resolve, resolve_with, ExtractionStrategy, StrategyQuery};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::{NavigationController, NavigationPolicy, RecordingSleeper};
    use crate::browser::fixture::FixtureSite;
    use crate::browser::HtmlBrowser;
    use crate::config::Settings;

    /// A controller over a fixture site with every delay set to zero.
    pub(crate) fn controller(site: FixtureSite) -> (NavigationController, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let nav = NavigationController::new(
            Box::new(HtmlBrowser::new(site)),
            NavigationPolicy::from(&Settings::without_delays()),
            Arc::new(sleeper.clone()),
        );
        (nav, sleeper)
    }
}
