//! Run configuration: environment loading plus a typestate builder.

mod builder;
mod types;

pub use builder::{CrawlConfigBuilder, Empty as BuilderEmpty};
pub use types::CrawlConfig;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ArchiverError;
use types::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_PAGES, DEFAULT_MAX_WORKERS, DEFAULT_OUTPUT_DIR,
    DEFAULT_PAGES_PER_DOMAIN, DEFAULT_REQUEST_DELAY_SECS, DEFAULT_RESPECT_ROBOTS_TXT,
    DEFAULT_SKIP_ASSETS, DEFAULT_START_URL,
};

/// Loads configuration from the process environment, honoring a `.env` file if present,
/// the same `KEY=default` pattern the original implementation used via `python-dotenv`.
pub fn from_env() -> Result<CrawlConfig, ArchiverError> {
    let _ = dotenvy::dotenv();

    let start_url = env_or("START_URL", DEFAULT_START_URL);
    let output_dir = env_or("OUTPUT_DIR", DEFAULT_OUTPUT_DIR);
    let max_workers = env_parse_or("MAX_WORKERS", DEFAULT_MAX_WORKERS)?;
    let max_depth = env_parse_or("MAX_DEPTH", DEFAULT_MAX_DEPTH)?;
    let max_pages = env_parse_or("MAX_PAGES", DEFAULT_MAX_PAGES)?;
    let pages_per_domain = env_parse_or("PAGES_PER_DOMAIN", DEFAULT_PAGES_PER_DOMAIN)?;
    let skip_assets = env_bool_or("SKIP_ASSETS", DEFAULT_SKIP_ASSETS)?;
    let respect_robots_txt = env_bool_or("RESPECT_ROBOTS_TXT", DEFAULT_RESPECT_ROBOTS_TXT)?;
    let request_delay_secs: f64 = env_parse_or("REQUEST_DELAY", DEFAULT_REQUEST_DELAY_SECS)?;

    CrawlConfigBuilder::new()
        .storage_dir(PathBuf::from(output_dir))
        .start_url(start_url)
        .max_workers(max_workers)
        .max_depth(max_depth)
        .max_pages(max_pages)
        .pages_per_domain(pages_per_domain)
        .skip_assets(skip_assets)
        .respect_robots_txt(respect_robots_txt)
        .request_delay(Duration::from_secs_f64(request_delay_secs))
        .build()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> Result<T, ArchiverError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| ArchiverError::Config(format!("{key}={v:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool_or(key: &str, default: bool) -> Result<bool, ArchiverError> {
    match std::env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ArchiverError::Config(format!(
                "{key}={other:?} is not a recognized boolean"
            ))),
        },
        Err(_) => Ok(default),
    }
}
