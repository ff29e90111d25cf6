//! Typestate builder for [`CrawlConfig`].
//!
//! `storage_dir` and `start_url` are required before `.build()` is reachable; the
//! compiler enforces the order via phantom marker types, the way the teacher's own
//! `CrawlConfigBuilder` gates `.build()` behind `WithStartUrl`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ArchiverError;

use super::types::{
    CrawlConfig, RawConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PAGES, DEFAULT_MAX_WORKERS,
    DEFAULT_PAGES_PER_DOMAIN, DEFAULT_REQUEST_DELAY_SECS, DEFAULT_RESPECT_ROBOTS_TXT,
    DEFAULT_SKIP_ASSETS,
};

pub struct Empty;
pub struct WithStorageDir;
pub struct WithStartUrl;

pub struct CrawlConfigBuilder<State> {
    storage_dir: Option<PathBuf>,
    start_url: Option<String>,
    max_workers: usize,
    max_depth: u32,
    max_pages: usize,
    pages_per_domain: usize,
    skip_assets: bool,
    respect_robots_txt: bool,
    request_delay: Duration,
    _state: PhantomData<State>,
}

impl Default for CrawlConfigBuilder<Empty> {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlConfigBuilder<Empty> {
    pub fn new() -> Self {
        Self {
            storage_dir: None,
            start_url: None,
            max_workers: DEFAULT_MAX_WORKERS,
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            pages_per_domain: DEFAULT_PAGES_PER_DOMAIN,
            skip_assets: DEFAULT_SKIP_ASSETS,
            respect_robots_txt: DEFAULT_RESPECT_ROBOTS_TXT,
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            _state: PhantomData,
        }
    }

    pub fn storage_dir(self, dir: impl AsRef<Path>) -> CrawlConfigBuilder<WithStorageDir> {
        CrawlConfigBuilder {
            storage_dir: Some(dir.as_ref().to_path_buf()),
            start_url: self.start_url,
            max_workers: self.max_workers,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            pages_per_domain: self.pages_per_domain,
            skip_assets: self.skip_assets,
            respect_robots_txt: self.respect_robots_txt,
            request_delay: self.request_delay,
            _state: PhantomData,
        }
    }
}

impl CrawlConfigBuilder<WithStorageDir> {
    /// Normalizes a bare host (no scheme) by prepending `https://`, matching the
    /// teacher's own start-url normalization.
    pub fn start_url(self, url: impl Into<String>) -> CrawlConfigBuilder<WithStartUrl> {
        let mut url = url.into();
        if !url.contains("://") {
            url = format!("https://{url}");
        }
        CrawlConfigBuilder {
            storage_dir: self.storage_dir,
            start_url: Some(url),
            max_workers: self.max_workers,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            pages_per_domain: self.pages_per_domain,
            skip_assets: self.skip_assets,
            respect_robots_txt: self.respect_robots_txt,
            request_delay: self.request_delay,
            _state: PhantomData,
        }
    }
}

macro_rules! impl_optional_setters {
    ($state:ty) => {
        impl CrawlConfigBuilder<$state> {
            pub fn max_workers(mut self, n: usize) -> Self {
                self.max_workers = n;
                self
            }

            pub fn max_depth(mut self, n: u32) -> Self {
                self.max_depth = n;
                self
            }

            pub fn max_pages(mut self, n: usize) -> Self {
                self.max_pages = n;
                self
            }

            pub fn pages_per_domain(mut self, n: usize) -> Self {
                self.pages_per_domain = n;
                self
            }

            pub fn skip_assets(mut self, v: bool) -> Self {
                self.skip_assets = v;
                self
            }

            pub fn respect_robots_txt(mut self, v: bool) -> Self {
                self.respect_robots_txt = v;
                self
            }

            pub fn request_delay(mut self, d: Duration) -> Self {
                self.request_delay = d;
                self
            }
        }
    };
}

impl_optional_setters!(WithStorageDir);
impl_optional_setters!(WithStartUrl);

impl CrawlConfigBuilder<WithStartUrl> {
    pub fn build(self) -> Result<CrawlConfig, ArchiverError> {
        let storage_dir = self
            .storage_dir
            .ok_or_else(|| ArchiverError::Config("storage_dir is required".into()))?;
        let start_url = self
            .start_url
            .ok_or_else(|| ArchiverError::Config("start_url is required".into()))?;

        url::Url::parse(&start_url)
            .map_err(|e| ArchiverError::Config(format!("invalid start_url {start_url:?}: {e}")))?;

        Ok(RawConfig {
            start_url,
            storage_dir,
            max_workers: self.max_workers.max(1),
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            pages_per_domain: self.pages_per_domain,
            skip_assets: self.skip_assets,
            respect_robots_txt: self.respect_robots_txt,
            request_delay: self.request_delay,
        }
        .into())
    }
}
