//! Scrape command: run the pipeline for one site and export the records.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::info;

use crate::browser::{Browser, HtmlBrowser, HttpSource};
#[cfg(feature = "browser")]
use crate::browser::{ChromeBrowser, ChromeOptions};
use crate::cli::helpers::{format_duration, truncate};
use crate::cli::{Driver, ScrapeArgs};
use crate::config::{load_settings_with_options, LoadOptions, Settings};
use crate::export::{export_records, resolve_output_path, OutputFormat};
use crate::models::Field;
use crate::scrapers::{pipeline, RunContext, TokioSleeper};

/// Scrape one site and write the records.
pub async fn cmd_scrape(config_path: Option<PathBuf>, args: ScrapeArgs) -> anyhow::Result<()> {
    let options = LoadOptions {
        config_path,
        use_cwd: false,
        output_dir: args.output_dir.clone(),
        output_filename: args.output_file.clone(),
        request_delay: args.delay,
        headless: args.headless,
    };
    let (config, settings) = load_settings_with_options(options).await?;
    settings
        .ensure_directories()
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let explicit_output = args.output.clone().or_else(|| {
        config
            .get::<String>("output.path")
            .map(|p| config.resolve_path(&p, &base_dir))
    });
    let format = args
        .format
        .clone()
        .or_else(|| config.get::<String>("output.format"))
        .map(|name| OutputFormat::from_name_or_csv(&name))
        .unwrap_or_default();

    let mut ctx = RunContext::from_config(&config, settings, &args.site)?;
    if let Some(max) = args.max_records {
        ctx.max_records = max;
    }

    println!(
        "{} Scraping {} (max {} records, {} driver)",
        style("→").cyan(),
        style(&ctx.profile.display_name).bold(),
        ctx.max_records,
        match args.driver {
            Driver::Chrome => "chrome",
            Driver::Http => "http",
        }
    );

    let browser = open_browser(args.driver, &ctx.settings).await?;
    let report = pipeline::run(&ctx, browser, Arc::new(TokioSleeper)).await?;

    let path = resolve_output_path(
        explicit_output.as_deref(),
        &ctx.settings,
        ctx.site_id(),
        format,
    );
    let written = export_records(
        &report.records,
        &ctx.data_fields,
        format,
        &path,
        &ctx.settings,
        ctx.site_id(),
    )?;
    info!("Export complete: {}", written.display());

    println!("\n{}", style("Scrape Summary").bold());
    println!("{}", "-".repeat(50));
    println!("{:<20} {}", "Site:", ctx.site_id());
    println!("{:<20} {}", "Links found:", report.links_found);
    println!(
        "{:<20} {}",
        "Records:",
        style(report.records.len()).green()
    );
    if report.rejected > 0 {
        println!("{:<20} {}", "Rejected:", style(report.rejected).yellow());
    }
    if report.skipped > 0 {
        println!("{:<20} {}", "Skipped:", style(report.skipped).yellow());
    }
    println!("{:<20} {}", "Output:", written.display());
    println!("{:<20} {}", "Elapsed:", format_duration(report.elapsed));

    if !report.records.is_empty() {
        println!("\n{:<40} {:<20} Phone", "Name", "City");
        println!("{}", "-".repeat(76));
        for record in report.records.iter().take(10) {
            println!(
                "{:<40} {:<20} {}",
                truncate(record.name(), 39),
                truncate(record.value_or_empty(Field::City), 19),
                record.value_or_empty(Field::Phone)
            );
        }
        if report.records.len() > 10 {
            println!("... and {} more", report.records.len() - 10);
        }
    } else {
        println!(
            "{} No records extracted. Try --driver chrome or check the site profile.",
            style("!").yellow()
        );
    }

    Ok(())
}

async fn open_browser(driver: Driver, settings: &Settings) -> anyhow::Result<Box<dyn Browser>> {
    match driver {
        Driver::Http => {
            let source = HttpSource::new(&settings.user_agent, settings.wait_timeout)?;
            Ok(Box::new(HtmlBrowser::new(source)))
        }
        #[cfg(feature = "browser")]
        Driver::Chrome => {
            let options = ChromeOptions {
                headless: settings.headless,
                request_timeout: settings.wait_timeout,
                ..Default::default()
            };
            let browser = ChromeBrowser::launch(&options)
                .await
                .context("starting Chrome (set CHROME_BIN or use --driver http)")?;
            Ok(Box::new(browser))
        }
        #[cfg(not(feature = "browser"))]
        Driver::Chrome => {
            anyhow::bail!("built without the `browser` feature; use --driver http")
        }
    }
}
