//! Configuration management for dirscrape using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{Result, ScrapeError};

/// Default record cap when `max_schools` is not configured.
pub const DEFAULT_MAX_RECORDS: usize = 50;

/// Default page cap for paginated listings.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory for exported files.
    pub output_dir: PathBuf,
    /// Explicit output filename inside `output_dir`.
    pub output_filename: Option<String>,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Page load timeout.
    pub wait_timeout: Duration,
    /// Navigation attempts before giving up on a URL.
    pub retry_attempts: u32,
    /// Base of the exponential navigation backoff.
    pub retry_delay: Duration,
    /// Politeness delay after every navigation.
    pub request_delay: Duration,
    /// Pause after clicking a control so the page can update.
    pub settle_delay: Duration,
    /// Pause between detail pages.
    pub record_delay: Duration,
    /// Run the browser without a window.
    pub headless: bool,
    /// Where to save debug screenshots, if anywhere.
    pub screenshots_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let output_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dirscrape");

        Self {
            output_dir,
            output_filename: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            wait_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_delay: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            record_delay: Duration::from_secs(1),
            headless: true,
            screenshots_dir: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom output directory.
    pub fn with_output_dir(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            ..Default::default()
        }
    }

    /// Settings with every pause set to zero, for tests and dry runs.
    pub fn without_delays() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            record_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        if let Some(dir) = &self.screenshots_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Configuration file contents with dot-path access.
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
    /// Path to the config file this was loaded from.
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: Value::Mapping(Default::default()),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers dirscrape config files in standard locations.
    pub async fn load() -> Self {
        let discovered = match prefer::load("dirscrape").await {
            Ok(pref_config) => pref_config.source_path().cloned(),
            Err(_) => None,
        };
        match discovered {
            Some(path) => match Self::load_from_path(&path).await {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            // No config file found, use defaults
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScrapeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse YAML (or JSON) text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(contents)
            .map_err(|e| ScrapeError::Config(format!("Failed to parse config: {}", e)))?;
        let root = match root {
            Value::Null => Value::Mapping(Default::default()),
            Value::Mapping(_) => root,
            _ => {
                return Err(ScrapeError::Config(
                    "config root must be a mapping".to_string(),
                ))
            }
        };
        Ok(Self {
            root,
            source_path: None,
        })
    }

    /// Raw value at a dot-separated path such as `patterns.address.pattern`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, part| node.as_mapping()?.get(part))
            .filter(|v| !v.is_null())
    }

    /// Typed value at a dot path. Values of the wrong shape read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.value(key)?;
        match serde_yaml::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Config key '{}' has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Seconds (integer or fractional) at a dot path.
    pub fn duration(&self, key: &str) -> Option<Duration> {
        self.get::<f64>(key)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(&self.root).unwrap_or_default()
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(dir) = self.get::<String>("output.directory") {
            settings.output_dir = self.resolve_path(&dir, base_dir);
        }
        if let Some(user_agent) = self.get::<String>("user_agent") {
            settings.user_agent = user_agent;
        }
        if let Some(timeout) = self.duration("wait_timeout") {
            settings.wait_timeout = timeout;
        }
        if let Some(attempts) = self.get::<u32>("retry_attempts") {
            settings.retry_attempts = attempts.max(1);
        }
        if let Some(delay) = self.duration("retry_delay") {
            settings.retry_delay = delay;
        }
        if let Some(delay) = self.duration("request_delay") {
            settings.request_delay = delay;
        }
        if let Some(delay) = self.duration("settle_delay") {
            settings.settle_delay = delay;
        }
        if let Some(delay) = self.duration("record_delay") {
            settings.record_delay = delay;
        }
        if let Some(dir) = self.get::<String>("debug.screenshots_dir") {
            settings.screenshots_dir = Some(self.resolve_path(&dir, base_dir));
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Override output directory (--output-dir flag).
    pub output_dir: Option<PathBuf>,
    /// Override output filename (--output-file flag).
    pub output_filename: Option<String>,
    /// Override politeness delay in seconds (DELAY_BETWEEN_REQUESTS).
    pub request_delay: Option<f64>,
    /// Override headless mode.
    pub headless: Option<bool>,
}

/// Load the config and the settings derived from it.
///
/// An explicit config path that cannot be read is an error; a missing
/// auto-discovered config falls back to defaults.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Config, Settings)> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();

    let cwd = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd()
    } else {
        config.base_dir().unwrap_or_else(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(output_dir) = options.output_dir {
        settings.output_dir = output_dir;
    }
    if let Some(filename) = options.output_filename {
        settings.output_filename = Some(filename);
    }
    if let Some(secs) = options.request_delay.filter(|s| s.is_finite() && *s >= 0.0) {
        settings.request_delay = Duration::from_secs_f64(secs);
    }
    if let Some(headless) = options.headless {
        settings.headless = headless;
    }

    Ok((config, settings))
}
