use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use dirscrape::cli::{self, Cli};

/// Install the global subscriber: stderr always, plus a timestamped file
/// when `LOG_FILE` names a directory or file stem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = std::env::var("LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| {
            let expanded = shellexpand::tilde(&v).to_string();
            let path = log_file_path(PathBuf::from(expanded));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok()?;
            }
            OpenOptions::new().create(true).append(true).open(path).ok()
        })
        .map(|file| fmt::layer().with_ansi(false).with_writer(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

/// `logs/` becomes `logs/dirscrape_<timestamp>.log`; `logs/run` becomes
/// `logs/run_<timestamp>.log`.
fn log_file_path(path: PathBuf) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    if path.is_dir() {
        return path.join(format!("dirscrape_{}.log", timestamp));
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dirscrape".to_string());
    path.with_file_name(format!("{}_{}.log", stem, timestamp))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
