//! Show the configuration a scrape would run with.

use std::path::PathBuf;

use console::style;

use crate::config::{load_settings_with_options, LoadOptions};
use crate::scrapers::RunContext;

pub async fn cmd_check_config(config_path: Option<PathBuf>, site: &str) -> anyhow::Result<()> {
    let options = LoadOptions {
        config_path,
        ..Default::default()
    };
    let (config, settings) = load_settings_with_options(options).await?;

    println!("\n{}", style("Configuration").bold());
    println!("{}", "-".repeat(50));
    match &config.source_path {
        Some(path) => println!("{:<20} {}", "Config file:", path.display()),
        None => println!("{:<20} {}", "Config file:", style("none (defaults)").dim()),
    }
    println!("{:<20} {}", "Output directory:", settings.output_dir.display());
    println!("{:<20} {:?}", "Wait timeout:", settings.wait_timeout);
    println!("{:<20} {}", "Retry attempts:", settings.retry_attempts);
    println!("{:<20} {:?}", "Retry delay:", settings.retry_delay);
    println!("{:<20} {:?}", "Request delay:", settings.request_delay);
    println!("{:<20} {}", "Headless:", settings.headless);

    let ctx = match RunContext::from_config(&config, settings, site) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            return Err(e.into());
        }
    };

    println!("\n{}", style("Site").bold());
    println!("{}", "-".repeat(50));
    println!("{:<20} {}", "Profile:", ctx.profile.display_name);
    println!("{:<20} {}", "Listing URL:", ctx.profile.listing_url);
    println!("{:<20} {}", "Max records:", ctx.max_records);
    println!("{:<20} {}", "Max pages:", ctx.max_pages);
    println!("{:<20} {}", "Address pattern:", ctx.address_pattern.as_str());
    println!("{:<20} {}", "Phone pattern:", ctx.phone_pattern.as_str());
    println!(
        "{:<20} {}",
        "Fields:",
        ctx.data_fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("{:<20} {}", "Seed URLs:", ctx.profile.seed_urls.len());

    if config.source_path.is_some() {
        println!("\n{}", style("Raw configuration").bold());
        println!("{}", "-".repeat(50));
        print!("{}", config.to_yaml());
    }

    println!("\n{} Configuration OK", style("✓").green());
    Ok(())
}
