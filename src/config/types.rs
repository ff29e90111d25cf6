//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one archiver run.
///
/// Every field mirrors an entry in the configuration table: defaults here match the
/// environment-variable defaults the binary entry point falls back to.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    start_url: String,
    storage_dir: PathBuf,
    max_workers: usize,
    max_depth: u32,
    max_pages: usize,
    pages_per_domain: usize,
    skip_assets: bool,
    respect_robots_txt: bool,
    request_delay: Duration,
}

impl CrawlConfig {
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn storage_dir(&self) -> &std::path::Path {
        &self.storage_dir
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn pages_per_domain(&self) -> usize {
        self.pages_per_domain
    }

    pub fn skip_assets(&self) -> bool {
        self.skip_assets
    }

    pub fn respect_robots_txt(&self) -> bool {
        self.respect_robots_txt
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }
}

pub(super) struct RawConfig {
    pub start_url: String,
    pub storage_dir: PathBuf,
    pub max_workers: usize,
    pub max_depth: u32,
    pub max_pages: usize,
    pub pages_per_domain: usize,
    pub skip_assets: bool,
    pub respect_robots_txt: bool,
    pub request_delay: Duration,
}

impl From<RawConfig> for CrawlConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            start_url: raw.start_url,
            storage_dir: raw.storage_dir,
            max_workers: raw.max_workers,
            max_depth: raw.max_depth,
            max_pages: raw.max_pages,
            pages_per_domain: raw.pages_per_domain,
            skip_assets: raw.skip_assets,
            respect_robots_txt: raw.respect_robots_txt,
            request_delay: raw.request_delay,
        }
    }
}

pub const DEFAULT_START_URL: &str = "https://example.com";
pub const DEFAULT_OUTPUT_DIR: &str = "./scraped_data";
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const DEFAULT_MAX_PAGES: usize = 100;
pub const DEFAULT_PAGES_PER_DOMAIN: usize = 50;
pub const DEFAULT_SKIP_ASSETS: bool = false;
pub const DEFAULT_RESPECT_ROBOTS_TXT: bool = true;
pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 0.5;
