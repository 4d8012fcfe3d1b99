//! Records read straight from a results table.
//!
//! Some listings show every field in the table and offer no detail links to
//! follow. When link collection comes back empty and the profile maps the
//! table's columns to fields, each data row becomes a record.

use tracing::{debug, info, warn};
use url::Url;

use super::context::RunContext;
use super::detail::{external_website, DetailOutcome};
use super::links::{results_tables, CELL_SELECTOR, HEADER_SELECTOR, ROW_SELECTOR};
use super::navigation::NavigationController;
use crate::browser::{ElementSnapshot, Query, Scope};
use crate::models::{Field, Record};
use crate::normalize::{normalize_address, normalize_phone};

/// Screen-reader suffix some directories append to link text.
const NEW_WINDOW_NOTE: &str = "(opens in new window)";

pub struct TableReader<'a> {
    ctx: &'a RunContext,
}

impl<'a> TableReader<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Read the first results table on the current page that has data rows.
    /// Returns nothing when the profile has no column mapping.
    pub async fn read(&self, nav: &mut NavigationController) -> Vec<DetailOutcome> {
        let columns = &self.ctx.profile.table_columns;
        if columns.is_empty() {
            return Vec::new();
        }
        let page_url = nav.current_url().await;
        let row_query = Query::css(ROW_SELECTOR);
        let cell_query = Query::css(CELL_SELECTOR);
        let header_query = Query::css(HEADER_SELECTOR);

        for table in results_tables(nav, &self.ctx.profile).await {
            let rows = nav.find_visible(&row_query, Scope::Within(&table)).await;
            let mut outcomes = Vec::new();
            let mut extracted = 0;

            for row in &rows {
                if extracted >= self.ctx.max_records {
                    info!("Reached limit of {} records", self.ctx.max_records);
                    break;
                }
                if !nav.find(&header_query, Scope::Within(row)).await.is_empty() {
                    continue;
                }
                let cells = nav.find(&cell_query, Scope::Within(row)).await;
                if cells.len() < columns.len() {
                    debug!("Skipping row with {} cells", cells.len());
                    continue;
                }
                if let Some(outcome) = self.read_row(nav, &cells, &page_url).await {
                    if outcome.record().is_some() {
                        extracted += 1;
                    }
                    outcomes.push(outcome);
                }
            }

            if !outcomes.is_empty() {
                info!("Read {} rows from the results table", outcomes.len());
                return outcomes;
            }
        }
        warn!("No results table with data rows on {}", page_url);
        Vec::new()
    }

    /// One data row. `None` for rows that are not entities at all: no name,
    /// or outside the profile's target grades.
    async fn read_row(
        &self,
        nav: &mut NavigationController,
        cells: &[ElementSnapshot],
        page_url: &str,
    ) -> Option<DetailOutcome> {
        let ctx = self.ctx;
        let profile = &ctx.profile;
        let source_host = Url::parse(page_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let excluded = &profile.excluded_website_domains;
        let anchor_query = Query::css("a[href]");

        let mut record = Record::default();
        for (field, cell) in profile.table_columns.iter().zip(cells) {
            let anchor = nav
                .find(&anchor_query, Scope::Within(cell))
                .await
                .into_iter()
                .next();
            let source = match &anchor {
                Some(a) if !a.trimmed_text().is_empty() => a,
                _ => cell,
            };
            let text = single_line(&source.text);

            match *field {
                Field::Name => {
                    record.set(Field::Name, text.replace(NEW_WINDOW_NOTE, ""));
                    let website = anchor
                        .as_ref()
                        .and_then(|a| a.href())
                        .and_then(|href| external_website(href, source_host.as_deref(), excluded));
                    if let Some(website) = website {
                        record.set_if_absent(Field::Website, website);
                    }
                }
                Field::AddressLine1 => {
                    normalize_address(&source.text, &ctx.address_pattern).apply_to(&mut record)
                }
                Field::Phone => record.set(Field::Phone, normalize_phone(&text)),
                Field::Website => {
                    let raw = anchor.as_ref().and_then(|a| a.href()).unwrap_or(text.as_str());
                    if let Some(website) = external_website(raw, source_host.as_deref(), excluded) {
                        record.set(Field::Website, website);
                    }
                }
                other => record.set(other, text),
            }
        }

        let name = record.name().to_string();
        if name.is_empty() {
            return None;
        }

        let keywords = &profile.table_grade_keywords;
        if !keywords.is_empty() && profile.table_columns.contains(&Field::GradesServed) {
            let grades = record.value_or_empty(Field::GradesServed).to_lowercase();
            if !keywords.iter().any(|k| grades.contains(k.as_str())) {
                info!("Skipping {}: grades {:?} outside the target range", name, grades);
                return None;
            }
        }

        if record.has_address() {
            if let Some(region) = &profile.default_region {
                record.set_if_absent(Field::Region, region.as_str());
            }
        }

        if ctx.name_rules.is_valid(&name) {
            debug!("Row record {:?}", record);
            Some(DetailOutcome::Extracted(record))
        } else {
            warn!("Rejecting table row {:?}: invalid name", name);
            Some(DetailOutcome::Rejected {
                url: page_url.to_string(),
                name,
                reason: "name failed validation".to_string(),
            })
        }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSite;
    use crate::config::Settings;
    use crate::scrapers::sites::{az_schools, tx_schools, SiteProfile};
    use crate::scrapers::testing::controller;

    const TX_LISTING: &str = "https://txschools.gov/?view=schools&lng=en";

    const RESULTS: &str = r#"
        <table>
          <thead><tr><th>School Name</th><th>School District</th><th>Street Address</th><th>Grades Served</th><th>Rating</th></tr></thead>
          <tbody>
            <tr>
              <td><a href="https://www.lincoln.example.org/">Lincoln Elementary <span>(opens in new window)</span></a></td>
              <td><a href="https://txschools.gov/districts/227901">Austin ISD</a></td>
              <td>123 Main St<br>Austin, TX 78701</td>
              <td>Early Education - Grade 5</td>
              <td>A</td>
            </tr>
            <tr>
              <td>Travis High School</td><td>Austin ISD</td>
              <td>1211 E Oltorf St, Austin, TX 78704</td><td>Grades 9-12</td><td>B</td>
            </tr>
            <tr>
              <td>Site Policy</td><td>Austin ISD</td>
              <td>1 Main St, Austin, TX 78701</td><td>Kindergarten - Grade 5</td><td></td>
            </tr>
            <tr><td colspan="5">Showing 3 of 3</td></tr>
            <tr>
              <td><a href="https://txschools.gov/schools/227901009/overview">Zilker Elementary</a></td>
              <td>Austin ISD</td><td>1900 Bluebonnet Ln, Austin, TX 78704</td><td>Prekindergarten - Grade 5</td><td>A</td>
            </tr>
          </tbody>
        </table>"#;

    fn context(profile: SiteProfile, max_records: usize) -> RunContext {
        let mut ctx = RunContext::new(profile, Settings::without_delays()).unwrap();
        ctx.max_records = max_records;
        ctx
    }

    async fn read(ctx: &RunContext, html: &str) -> Vec<DetailOutcome> {
        let (mut nav, _) = controller(FixtureSite::new().page(TX_LISTING, html));
        nav.navigate(TX_LISTING).await.unwrap();
        TableReader::new(ctx).read(&mut nav).await
    }

    #[tokio::test]
    async fn test_rows_become_records() {
        let outcomes = read(&context(tx_schools(), 50), RESULTS).await;

        // Header, short and out-of-range rows produce nothing.
        assert_eq!(outcomes.len(), 3);
        let records: Vec<&Record> = outcomes.iter().filter_map(DetailOutcome::record).collect();
        assert_eq!(records.len(), 2);

        let lincoln = records[0];
        assert_eq!(lincoln.name(), "Lincoln Elementary");
        assert_eq!(lincoln.get(Field::ParentOrganization), Some("Austin ISD"));
        assert_eq!(lincoln.get(Field::AddressLine1), Some("123 Main St"));
        assert_eq!(lincoln.get(Field::City), Some("Austin"));
        assert_eq!(lincoln.get(Field::Region), Some("TX"));
        assert_eq!(lincoln.get(Field::PostalCode), Some("78701"));
        assert_eq!(lincoln.get(Field::GradesServed), Some("Early Education - Grade 5"));
        assert_eq!(lincoln.get(Field::Website), Some("https://www.lincoln.example.org"));

        // A link back into the directory is not the school's website.
        let zilker = records[1];
        assert_eq!(zilker.name(), "Zilker Elementary");
        assert_eq!(zilker.get(Field::Website), None);

        assert!(matches!(
            &outcomes[1],
            DetailOutcome::Rejected { name, .. } if name == "Site Policy"
        ));
    }

    #[tokio::test]
    async fn test_row_cap_counts_records() {
        let outcomes = read(&context(tx_schools(), 1), RESULTS).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].record().map(|r| r.name()), Some("Lincoln Elementary"));
    }

    #[tokio::test]
    async fn test_profile_without_columns_reads_nothing() {
        assert!(read(&context(az_schools(), 50), RESULTS).await.is_empty());
    }

    #[tokio::test]
    async fn test_grade_filter_is_optional() {
        let mut profile = tx_schools();
        profile.table_grade_keywords.clear();
        let outcomes = read(&context(profile, 50), RESULTS).await;
        let names: Vec<&str> = outcomes
            .iter()
            .filter_map(DetailOutcome::record)
            .map(Record::name)
            .collect();
        assert_eq!(names, vec!["Lincoln Elementary", "Travis High School", "Zilker Elementary"]);
    }
}
