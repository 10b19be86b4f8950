//! Scraper configuration from environment variables
//!
//! Every value has a default matching the public Go module index and proxy, so
//! a bare `modwatch` invocation scrapes golang.org into `gomodindex.sqlite`.

use std::env;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "gomodindex.sqlite";
pub const DEFAULT_INDEX_URL: &str = "https://index.golang.org";
pub const DEFAULT_PROXY_URL: &str = "https://proxy.golang.org";
/// Max number of items the index API returns per page
pub const DEFAULT_PAGE_LIMIT: usize = 2000;
pub const DEFAULT_WORKERS: usize = 100;
pub const DEFAULT_COMMIT_BATCH: usize = 10_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4000;
pub const DEFAULT_USER_AGENT: &str = "modwatch/0.1";

/// Configuration for the scrape runtime
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Base URL of the index service (`{base}/index`)
    pub index_url: String,

    /// Base URL of the module proxy (`{base}/{module}/@v/{version}.mod`)
    pub proxy_url: String,

    /// Records requested per index page
    pub page_limit: usize,

    /// Number of concurrent enrichment workers
    pub workers: usize,

    /// Inserts per storage transaction
    pub commit_batch: usize,

    /// Capacity of each bounded queue between stages
    pub queue_capacity: usize,

    pub index_timeout: Duration,
    pub proxy_timeout: Duration,

    /// Pause between consecutive index page requests
    pub scrape_delay: Duration,

    /// Client-identifying header sent to both services
    pub user_agent: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            workers: DEFAULT_WORKERS,
            commit_batch: DEFAULT_COMMIT_BATCH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            index_timeout: Duration::from_millis(3_000),
            proxy_timeout: Duration::from_millis(10_000),
            scrape_delay: Duration::ZERO,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `MODWATCH_DB_PATH` (default: gomodindex.sqlite)
    /// - `MODWATCH_INDEX_URL` (default: https://index.golang.org)
    /// - `MODWATCH_PROXY_URL` (default: https://proxy.golang.org)
    /// - `MODWATCH_PAGE_LIMIT` (default: 2000)
    /// - `MODWATCH_WORKERS` (default: 100)
    /// - `MODWATCH_COMMIT_BATCH` (default: 10000)
    /// - `MODWATCH_QUEUE_CAPACITY` (default: 4000)
    /// - `MODWATCH_INDEX_TIMEOUT_MS` (default: 3000)
    /// - `MODWATCH_PROXY_TIMEOUT_MS` (default: 10000)
    /// - `MODWATCH_SCRAPE_DELAY_MS` (default: 0)
    /// - `MODWATCH_USER_AGENT` (default: modwatch/0.1)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let index_url = lookup("MODWATCH_INDEX_URL").unwrap_or(defaults.index_url);
        let proxy_url = lookup("MODWATCH_PROXY_URL").unwrap_or(defaults.proxy_url);
        let urls = [
            ("MODWATCH_INDEX_URL", &index_url),
            ("MODWATCH_PROXY_URL", &proxy_url),
        ];
        for (name, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must start with http:// or https://",
                    name
                )));
            }
        }

        let config = Self {
            db_path: lookup("MODWATCH_DB_PATH").unwrap_or(defaults.db_path),
            index_url: index_url.trim_end_matches('/').to_string(),
            proxy_url: proxy_url.trim_end_matches('/').to_string(),
            page_limit: parse_var(&lookup, "MODWATCH_PAGE_LIMIT", defaults.page_limit)?,
            workers: parse_var(&lookup, "MODWATCH_WORKERS", defaults.workers)?,
            commit_batch: parse_var(&lookup, "MODWATCH_COMMIT_BATCH", defaults.commit_batch)?,
            queue_capacity: parse_var(&lookup, "MODWATCH_QUEUE_CAPACITY", defaults.queue_capacity)?,
            index_timeout: Duration::from_millis(parse_var(
                &lookup,
                "MODWATCH_INDEX_TIMEOUT_MS",
                defaults.index_timeout.as_millis() as u64,
            )?),
            proxy_timeout: Duration::from_millis(parse_var(
                &lookup,
                "MODWATCH_PROXY_TIMEOUT_MS",
                defaults.proxy_timeout.as_millis() as u64,
            )?),
            scrape_delay: Duration::from_millis(parse_var(
                &lookup,
                "MODWATCH_SCRAPE_DELAY_MS",
                0u64,
            )?),
            user_agent: lookup("MODWATCH_USER_AGENT").unwrap_or(defaults.user_agent),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("page_limit", self.page_limit),
            ("workers", self.workers),
            ("commit_batch", self.commit_batch),
            ("queue_capacity", self.queue_capacity),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be greater than 0", name)));
            }
        }

        if self.db_path.is_empty() {
            return Err(ConfigError::InvalidValue("db_path cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{}='{}' is not a valid number", key, raw))
        }),
        None => Ok(default),
    }
}
