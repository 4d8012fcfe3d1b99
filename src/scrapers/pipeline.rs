//! One complete run: collect links, then extract each detail page in turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::context::RunContext;
use super::detail::{DetailExtractor, DetailOutcome};
use super::links::LinkCollector;
use super::navigation::{NavigationController, NavigationPolicy};
use super::pacing::{PauseKind, Sleeper};
use super::rows::TableReader;
use crate::browser::Browser;
use crate::error::Result;
use crate::models::Record;

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub site: String,
    pub links_found: usize,
    pub records: Vec<Record>,
    /// Pages read whose record failed validation.
    pub rejected: usize,
    /// Links that were never read.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl RunReport {
    fn tally(&mut self, outcome: DetailOutcome) {
        match outcome {
            DetailOutcome::Extracted(record) => {
                info!("Extracted {}", record.name());
                self.records.push(record);
            }
            DetailOutcome::Rejected { url, name, reason } => {
                warn!("Dropped {} ({:?}): {}", url, name, reason);
                self.rejected += 1;
            }
            DetailOutcome::Skipped { url, reason } => {
                warn!("Skipped {}: {}", url, reason);
                self.skipped += 1;
            }
        }
    }
}

/// Run the pipeline for `ctx` on `browser`.
///
/// The browser is closed before returning, whether or not the run
/// succeeded.
pub async fn run(
    ctx: &RunContext,
    browser: Box<dyn Browser>,
    sleeper: Arc<dyn Sleeper>,
) -> Result<RunReport> {
    let mut nav = NavigationController::new(browser, NavigationPolicy::from(&ctx.settings), sleeper);
    let result = run_with(ctx, &mut nav).await;
    nav.close().await;
    result
}

async fn run_with(ctx: &RunContext, nav: &mut NavigationController) -> Result<RunReport> {
    let started = Instant::now();
    if let Some(dir) = &ctx.settings.screenshots_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    info!("Starting {} ({})", ctx.profile.display_name, ctx.profile.listing_url);
    let links = LinkCollector::new(ctx).collect(nav).await?;
    let mut report = RunReport {
        site: ctx.site_id().to_string(),
        links_found: links.len(),
        ..Default::default()
    };
    if links.is_empty() {
        warn!("No candidate links found for {}", ctx.site_id());
        if !ctx.profile.table_columns.is_empty() {
            info!("Reading records from the results table instead");
            for outcome in TableReader::new(ctx).read(nav).await {
                report.tally(outcome);
            }
        }
    }

    let progress = ProgressBar::new(links.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut extractor = DetailExtractor::new(ctx);
    for (index, link) in links.iter().enumerate() {
        if report.records.len() >= ctx.max_records {
            info!("Reached limit of {} records", ctx.max_records);
            break;
        }
        if index > 0 {
            nav.pause(PauseKind::Record).await;
        }
        progress.set_message(link.url.clone());

        let outcome = extractor.extract(nav, link).await;
        report.tally(outcome);
        progress.inc(1);
    }
    progress.finish_and_clear();

    report.elapsed = started.elapsed();
    info!(
        "Finished {}: {} records from {} links ({} rejected, {} skipped) in {:.1}s",
        report.site,
        report.records.len(),
        report.links_found,
        report.rejected,
        report.skipped,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::browser::fixture::FixtureSite;
    use crate::browser::{ElementSnapshot, HtmlBrowser, LoadedPage, Query, Scope};
    use crate::config::Settings;
    use crate::error::BrowserError;
    use crate::models::Field;
    use crate::normalize::is_valid_name;
    use crate::scrapers::pacing::RecordingSleeper;
    use crate::scrapers::sites::{az_schools, tx_schools};

    const LISTING: &str = "https://azreportcards.azed.gov/schools";

    /// Static HTML behind a backend that captures images.
    struct ImageCapture(HtmlBrowser<FixtureSite>);

    #[async_trait]
    impl Browser for ImageCapture {
        async fn goto(&mut self, url: &str) -> std::result::Result<LoadedPage, BrowserError> {
            self.0.goto(url).await
        }

        async fn find(
            &mut self,
            query: &Query,
            scope: Scope<'_>,
        ) -> std::result::Result<Vec<ElementSnapshot>, BrowserError> {
            self.0.find(query, scope).await
        }

        async fn click(&mut self, element: &ElementSnapshot) -> std::result::Result<(), BrowserError> {
            self.0.click(element).await
        }

        async fn body_text(&mut self) -> std::result::Result<String, BrowserError> {
            self.0.body_text().await
        }

        async fn title(&mut self) -> std::result::Result<String, BrowserError> {
            self.0.title().await
        }

        async fn current_url(&mut self) -> std::result::Result<String, BrowserError> {
            self.0.current_url().await
        }

        async fn screenshot(&mut self, path: &Path) -> std::result::Result<(), BrowserError> {
            self.0.screenshot(path).await
        }

        fn screenshot_extension(&self) -> &'static str {
            "png"
        }
    }

    fn site() -> FixtureSite {
        let entity = |id: u32, name: &str| {
            format!(r#"<a class="no-underline" href="/schools/detail/{id}">{name}</a>"#)
        };
        let detail = |name: &str, contact: &str| {
            format!(
                r#"<title>{name}</title><p class="entity_name body-2 primary-text">{name}</p>
                   <h3>Contact Information</h3><div>{contact}</div>"#
            )
        };
        FixtureSite::new()
            .page(
                LISTING,
                r#"<button value="ALL" data-href="/schools?letter=ALL">ALL</button>"#,
            )
            .page(
                "https://azreportcards.azed.gov/schools?letter=ALL",
                &[
                    entity(1, "Site Policy"),
                    entity(2, "Sunrise Elementary"),
                    entity(3, "Cactus High School"),
                    r#"<a class="no-underline" href="/schools/detail/bad">Apache Academy</a>"#.to_string(),
                ]
                .concat(),
            )
            .page(
                "https://azreportcards.azed.gov/schools/detail/1",
                &detail("Site Policy", "100 Main St, Mesa, AZ 85201"),
            )
            .page(
                "https://azreportcards.azed.gov/schools/detail/2",
                &detail("Sunrise Elementary", "200 E Sun Rd, Tempe, AZ 85281"),
            )
            .page(
                "https://azreportcards.azed.gov/schools/detail/3",
                &detail("Cactus High School", "300 W Cactus Rd, Phoenix, AZ 85029 (602) 555-0123"),
            )
    }

    fn context(max_records: usize) -> RunContext {
        let mut ctx = RunContext::new(az_schools(), Settings::without_delays()).unwrap();
        ctx.max_records = max_records;
        ctx
    }

    #[tokio::test]
    async fn test_run_extracts_valid_records_and_counts_failures() {
        let sleeper = RecordingSleeper::new();
        let report = run(
            &context(50),
            Box::new(HtmlBrowser::new(site())),
            Arc::new(sleeper.clone()),
        )
        .await
        .unwrap();

        assert_eq!(report.site, "az_schools");
        // "/detail/bad" passes the link filter but not the detail URL shape.
        assert_eq!(report.links_found, 4);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.records.iter().all(|r| is_valid_name(r.name())));

        let cactus = &report.records[1];
        assert_eq!(cactus.name(), "Cactus High School");
        assert_eq!(cactus.get(Field::City), Some("Phoenix"));
        assert_eq!(cactus.get(Field::Phone), Some("(602) 555-0123"));

        // One politeness pause between each pair of detail pages.
        assert_eq!(sleeper.of_kind(PauseKind::Record).len(), 3);
    }

    #[tokio::test]
    async fn test_record_cap_applies_to_details() {
        let report = run(
            &context(1),
            Box::new(HtmlBrowser::new(site())),
            Arc::new(RecordingSleeper::new()),
        )
        .await
        .unwrap();

        assert_eq!(report.links_found, 1);
        assert!(report.records.len() + report.rejected <= 1);
    }

    #[tokio::test]
    async fn test_screenshots_written_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(50);
        ctx.settings.screenshots_dir = Some(dir.path().join("shots"));

        run(&ctx, Box::new(HtmlBrowser::new(site())), Arc::new(RecordingSleeper::new()))
            .await
            .unwrap();

        let shots = dir.path().join("shots");
        assert!(shots.join("az_schools_listing.html").exists());
        assert!(shots.join("az_schools_detail_1.html").exists());

        // The file extension follows the backend.
        let dir = tempfile::tempdir().unwrap();
        ctx.settings.screenshots_dir = Some(dir.path().to_path_buf());
        let browser = ImageCapture(HtmlBrowser::new(site()));
        run(&ctx, Box::new(browser), Arc::new(RecordingSleeper::new()))
            .await
            .unwrap();

        assert!(dir.path().join("az_schools_listing.png").exists());
        assert!(dir.path().join("az_schools_detail_1.png").exists());
        assert!(!dir.path().join("az_schools_listing.html").exists());
    }

    #[tokio::test]
    async fn test_table_rows_read_when_listing_has_no_links() {
        let listing = "https://txschools.gov/?view=schools&lng=en";
        let site = FixtureSite::new().page(
            listing,
            r#"<table>
                 <tr><th>School Name</th><th>School District</th><th>Street Address</th><th>Grades Served</th></tr>
                 <tr><td>Lincoln Elementary</td><td>Austin ISD</td>
                     <td>123 Main St, Austin, TX 78701</td><td>Early Education - Grade 5</td></tr>
                 <tr><td>Travis High School</td><td>Austin ISD</td>
                     <td>1211 E Oltorf St, Austin, TX 78704</td><td>Grades 9-12</td></tr>
                 <tr><td>Site Policy</td><td>Austin ISD</td>
                     <td>1 Main St, Austin, TX 78701</td><td>Kindergarten - Grade 5</td></tr>
               </table>"#,
        );
        let mut profile = tx_schools();
        profile.listing_url = listing.to_string();
        profile.seed_urls.clear();
        let ctx = RunContext::new(profile, Settings::without_delays()).unwrap();

        let report = run(&ctx, Box::new(HtmlBrowser::new(site)), Arc::new(RecordingSleeper::new()))
            .await
            .unwrap();

        assert_eq!(report.links_found, 0);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.rejected, 1);
        let lincoln = &report.records[0];
        assert_eq!(lincoln.name(), "Lincoln Elementary");
        assert_eq!(lincoln.get(Field::ParentOrganization), Some("Austin ISD"));
        assert_eq!(lincoln.get(Field::City), Some("Austin"));
        assert_eq!(lincoln.get(Field::Region), Some("TX"));
        assert_eq!(lincoln.get(Field::PostalCode), Some("78701"));
    }
}
