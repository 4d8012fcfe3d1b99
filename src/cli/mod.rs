//! Command-line interface.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "dirscrape")]
#[command(version, about = "Extract school records from public directory websites", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Configuration file (auto-discovered when omitted)
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect links and extract records for one site
    Scrape(ScrapeArgs),

    /// List the built-in site profiles
    Sites,

    /// Load and print the resolved configuration
    CheckConfig {
        /// Site profile to resolve
        #[arg(short, long, env = "SCRAPER_TYPE", default_value = "tx_schools")]
        site: String,
    },
}

/// Browser backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    /// Headless Chromium over CDP (renders JavaScript)
    Chrome,
    /// Plain HTTP fetches of server-rendered HTML
    Http,
}

#[derive(Args)]
pub struct ScrapeArgs {
    /// Site profile (tx_schools, az_schools)
    #[arg(short, long, env = "SCRAPER_TYPE", default_value = "tx_schools")]
    pub site: String,

    /// Directory for exported files
    #[arg(long, env = "OUTPUT_DIRECTORY")]
    pub output_dir: Option<PathBuf>,

    /// File name inside the output directory
    #[arg(long, env = "OUTPUT_FILENAME")]
    pub output_file: Option<String>,

    /// Full output path (overrides --output-dir and --output-file)
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Output format (csv, json)
    #[arg(short, long, env = "OUTPUT_FORMAT")]
    pub format: Option<String>,

    /// Run the browser without a window (accepts true/false, yes/no, 1/0)
    #[arg(
        long,
        env = "HEADLESS_BROWSER",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub headless: Option<bool>,

    /// Browser backend
    #[arg(long, value_enum, default_value_t = Driver::Chrome)]
    pub driver: Driver,

    /// Maximum number of records to extract
    #[arg(short = 'n', long)]
    pub max_records: Option<usize>,

    /// Politeness delay between requests, in seconds
    #[arg(long, env = "DELAY_BETWEEN_REQUESTS")]
    pub delay: Option<f64>,
}

/// Run the parsed command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Scrape(args) => commands::scrape::cmd_scrape(cli.config, args).await,
        Commands::Sites => commands::sites::cmd_sites(),
        Commands::CheckConfig { site } => commands::check_config::cmd_check_config(cli.config, &site).await,
    }
}
