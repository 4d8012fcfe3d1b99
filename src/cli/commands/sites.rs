//! List the built-in site profiles.

use console::style;

use crate::cli::helpers::truncate;
use crate::scrapers::sites::{builtin, BUILTIN_SITES};

pub fn cmd_sites() -> anyhow::Result<()> {
    println!("\n{}", style("Site Profiles").bold());
    println!("{}", "-".repeat(80));
    println!("{:<12} {:<40} Listing", "ID", "Name");
    println!("{}", "-".repeat(80));

    for id in BUILTIN_SITES {
        let Some(profile) = builtin(id) else {
            continue;
        };
        println!(
            "{:<12} {:<40} {}",
            profile.id,
            truncate(&profile.display_name, 39),
            profile.listing_url
        );
    }

    Ok(())
}
