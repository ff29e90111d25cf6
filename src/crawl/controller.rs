//! C10 - Crawl Controller: owns the work queue, worker pool, visited set, counters, stop
//! signal, and run manifest emission (§4.8). The main loop's `FuturesUnordered` +
//! semaphore-free fixed-concurrency shape is grounded on the teacher's
//! `crawl_engine/core.rs::crawl_pages` loop, generalized from browser-page creation to
//! `reqwest` GETs and re-targeted at this crate's admission/stop-signal semantics.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use dashmap::DashSet;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};
use tokio::sync::{Mutex, Semaphore};
use url::Url;

use crate::asset_fetcher::AssetFetcher;
use crate::config::CrawlConfig;
use crate::crawl::manifest::{PageRecord, RunManifest, Stats};
use crate::crawl::worker;
use crate::error::ArchiverError;
use crate::html_rewriter;
use crate::http_client::build_client;
use crate::rate_limiter::RateLimiter;
use crate::robots::RobotsOracle;
use crate::url_policy;

/// Reports per-page progress; the Controller calls this once per completed admission
/// attempt. The default logs at info level, matching the original implementation's
/// progress-bar description line.
pub trait ProgressSink: Send + Sync + 'static {
    fn on_page(&self, pages_scraped: usize, page_cap: usize, assets_downloaded: usize);
}

pub struct LoggingProgress;

impl ProgressSink for LoggingProgress {
    fn on_page(&self, pages_scraped: usize, page_cap: usize, assets_downloaded: usize) {
        info!("progress: {pages_scraped}/{page_cap} pages, {assets_downloaded} assets downloaded");
    }
}

#[derive(Default)]
struct AdmissionState {
    pages_stored: usize,
    per_origin_counts: HashMap<String, usize>,
}

pub struct Controller<P: ProgressSink = LoggingProgress> {
    config: CrawlConfig,
    seed_host: String,
    run_root: PathBuf,
    client: reqwest::Client,
    robots: RobotsOracle,
    rate_limiter: Arc<RateLimiter>,
    /// The single global admission semaphore (§5): shared with `fetcher` so page GETs
    /// (here) and asset GETs (inside `AssetFetcher::download`) draw from one combined
    /// cap of `max_workers` concurrent in-flight HTTP requests.
    semaphore: Arc<Semaphore>,
    fetcher: AssetFetcher,
    admission: Mutex<AdmissionState>,
    visited: Arc<DashSet<String>>,
    stop: Arc<AtomicBool>,
    pages: Mutex<HashMap<String, PageRecord>>,
    pages_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
    progress: P,
}

impl Controller<LoggingProgress> {
    pub fn new(config: CrawlConfig) -> Result<Self, ArchiverError> {
        Self::with_progress(config, LoggingProgress)
    }
}

impl<P: ProgressSink> Controller<P> {
    pub fn with_progress(config: CrawlConfig, progress: P) -> Result<Self, ArchiverError> {
        let seed = Url::parse(config.start_url())
            .map_err(|e| ArchiverError::Config(format!("invalid start_url: {e}")))?;
        let seed_host = seed
            .host_str()
            .ok_or_else(|| ArchiverError::Config("start_url has no host".into()))?
            .to_string();

        let run_dir_name = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let run_root = config.storage_dir().join(run_dir_name);

        let client = build_client(config.max_workers())
            .map_err(|source| ArchiverError::Http { url: config.start_url().to_string(), source })?;
        let rate_limiter = Arc::new(RateLimiter::new(config.request_delay()));
        let robots = RobotsOracle::new(client.clone());
        let semaphore = Arc::new(Semaphore::new(config.max_workers().max(1)));
        let fetcher = AssetFetcher::new(
            client.clone(),
            run_root.clone(),
            rate_limiter.clone(),
            semaphore.clone(),
            config.skip_assets(),
        );

        Ok(Self {
            config,
            seed_host,
            run_root,
            client,
            robots,
            rate_limiter,
            semaphore,
            fetcher,
            admission: Mutex::new(AdmissionState::default()),
            visited: Arc::new(DashSet::new()),
            stop: Arc::new(AtomicBool::new(false)),
            pages: Mutex::new(HashMap::new()),
            pages_failed: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            progress,
        })
    }

    pub fn run_root(&self) -> &std::path::Path {
        &self.run_root
    }

    /// Runs the crawl to completion (queue drained or a quota tripped the stop signal)
    /// and writes `metadata.json`.
    pub async fn run(self: Arc<Self>) -> Result<RunManifest, ArchiverError> {
        let start = Instant::now();
        let seed = Url::parse(self.config.start_url()).expect("validated in with_progress");

        let queue: Arc<Mutex<VecDeque<(Url, u32)>>> =
            Arc::new(Mutex::new(VecDeque::from([(seed, 0)])));

        let concurrency = self.config.max_workers();
        let mut active = FuturesUnordered::new();

        loop {
            while active.len() < concurrency {
                let popped = {
                    let mut q = queue.lock().await;
                    q.pop_front()
                };
                let Some((url, depth)) = popped else { break };

                if !self.admit(&url, depth).await {
                    continue;
                }

                let this = self.clone();
                let queue = queue.clone();
                active.push(tokio::spawn(async move {
                    this.process_one(url, depth, queue).await;
                }));
            }

            if active.is_empty() {
                let remaining = queue.lock().await.is_empty();
                if remaining {
                    break;
                }
                continue;
            }

            match active.next().await {
                Some(Ok(())) => {}
                Some(Err(e)) => warn!("page worker task panicked: {e}"),
                None => break,
            }
        }

        self.retrofit_links().await;
        self.emit_manifest(seed.as_str(), start.elapsed()).await
    }

    /// Admission per §4.8/§5: drops on stop/depth overflow/already-visited/per-origin
    /// cap, and trips the stop signal atomically with the last permitted global-cap
    /// increment. Counters are only incremented on full admission.
    async fn admit(&self, url: &Url, depth: u32) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return false;
        }
        if depth > self.config.max_depth() {
            return false;
        }

        let canonical = url_policy::without_fragment(url);
        if !self.visited.insert(canonical.as_str().to_string()) {
            return false;
        }

        let host = url.host_str().unwrap_or("").to_string();
        let mut state = self.admission.lock().await;

        let origin_count = *state.per_origin_counts.get(&host).unwrap_or(&0);
        if origin_count >= self.config.pages_per_domain() {
            return false;
        }
        if state.pages_stored >= self.config.max_pages() {
            self.stop.store(true, Ordering::Release);
            return false;
        }

        *state.per_origin_counts.entry(host).or_insert(0) += 1;
        state.pages_stored += 1;
        true
    }

    async fn process_one(&self, url: Url, depth: u32, queue: Arc<Mutex<VecDeque<(Url, u32)>>>) {
        info!("crawling [depth {depth}]: {url}");

        let result = worker::process_url(
            &url,
            depth,
            &self.client,
            &self.robots,
            self.config.respect_robots_txt(),
            &self.rate_limiter,
            &self.semaphore,
            &self.fetcher,
            &self.visited,
            &self.run_root,
        )
        .await;

        if result.failed {
            self.pages_failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(record) = result.page_record {
            self.bytes_downloaded.fetch_add(record.size_bytes as u64, Ordering::Relaxed);
            self.pages.lock().await.insert(record.url.clone(), record);
        }

        self.progress.on_page(
            self.pages.lock().await.len(),
            self.config.max_pages(),
            self.fetcher.cache().stored_count(),
        );

        if self.stop.load(Ordering::Acquire) {
            return;
        }

        let mut to_enqueue = Vec::new();
        for link in result.discovered {
            if url_policy::in_scope(&link, &self.seed_host) {
                to_enqueue.push((link, depth + 1));
            }
        }
        if !to_enqueue.is_empty() {
            queue.lock().await.extend(to_enqueue);
        }
    }

    /// Retroactive inbound-link pass (§4.6/§8 S2), run once after the queue drains.
    ///
    /// A page is rewritten and stored the moment it is fetched, before any link it
    /// discovers has been admitted, so a same-host link to a page that is crawled
    /// *later* is still absolute at the time its source page is written. This mirrors
    /// the teacher's `link_rewriter::on_page_saved`, which re-opens already-saved pages
    /// to patch in links to pages saved afterward: once the final set of stored pages is
    /// known, every stored HTML page is re-scanned and any `<a>`/`<area>` href matching a
    /// URL that ended up with a `PageRecord` is rewritten to `{digest}.html`.
    async fn retrofit_links(&self) {
        let stored_pages: Vec<PageRecord> = self.pages.lock().await.values().cloned().collect();

        let canonical_targets: HashSet<String> = stored_pages
            .iter()
            .filter_map(|p| Url::parse(&p.url).ok())
            .map(|u| url_policy::without_fragment(&u).as_str().to_string())
            .collect();

        for record in stored_pages
            .iter()
            .filter(|p| p.content_type.to_ascii_lowercase().contains("html"))
        {
            let content = match tokio::fs::read_to_string(&record.stored_path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("retrofit: failed to read {}: {e}", record.stored_path.display());
                    continue;
                }
            };

            match html_rewriter::retrofit_links(&content, &canonical_targets) {
                Ok(rewritten) if rewritten != content => {
                    if let Err(e) = crate::storage::write_file(&record.stored_path, rewritten.as_bytes()).await {
                        warn!("retrofit: failed to rewrite {}: {e}", record.stored_path.display());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("retrofit: parse failure for {}: {e}", record.stored_path.display()),
            }
        }
    }

    async fn emit_manifest(&self, start_url: &str, elapsed: std::time::Duration) -> Result<RunManifest, ArchiverError> {
        let pages = self.pages.lock().await.clone();
        let admission = self.admission.lock().await;

        let domain_counts = admission.per_origin_counts.clone();
        let pages_scraped = admission.pages_stored;
        let pages_failed = self.pages_failed.load(Ordering::Relaxed) as usize;
        let bytes_downloaded = self.bytes_downloaded.load(Ordering::Relaxed);
        let elapsed_seconds = elapsed.as_secs_f64();
        let pages_per_second = if elapsed_seconds > 0.0 {
            pages_scraped as f64 / elapsed_seconds
        } else {
            0.0
        };

        let asset_map: HashMap<String, String> = self.fetcher.cache().snapshot_stored().into_iter().collect();
        let failed_assets: Vec<String> = self.fetcher.cache().snapshot_failed();
        let failed_set: HashSet<&str> = failed_assets.iter().map(String::as_str).collect();
        debug_assert!(asset_map.keys().all(|k| !failed_set.contains(k.as_str())));

        let manifest = RunManifest {
            start_url: start_url.to_string(),
            total_pages: pages.len(),
            pages_scraped,
            max_pages_limit: self.config.max_pages(),
            pages_per_domain_limit: self.config.pages_per_domain(),
            timestamp: Utc::now(),
            stats: Stats {
                pages_scraped,
                pages_failed,
                bytes_downloaded,
                elapsed_seconds,
                pages_per_second,
                domain_counts: domain_counts.clone(),
                total_domains: domain_counts.len(),
            },
            domain_counts,
            pages,
            asset_map,
            failed_assets,
        };

        let json = manifest.to_json()?;
        let manifest_path = self.run_root.join("metadata.json");
        crate::storage::write_file(&manifest_path, json.as_bytes()).await?;

        log_summary(&manifest);

        Ok(manifest)
    }
}

fn log_summary(manifest: &RunManifest) {
    info!("{}", "=".repeat(60));
    info!("Scraping Summary:");
    info!("  Pages scraped: {}/{}", manifest.pages_scraped, manifest.max_pages_limit);
    info!("  Assets downloaded: {}", manifest.asset_map.len());
    info!("  Failed assets: {}", manifest.failed_assets.len());
    info!("  Pages failed: {}", manifest.stats.pages_failed);
    info!("  Data downloaded: {} bytes", manifest.stats.bytes_downloaded);
    info!("  Time elapsed: {:.2} seconds", manifest.stats.elapsed_seconds);
    info!("  Pages/second: {:.2}", manifest.stats.pages_per_second);
    info!("  Domains scraped: {}", manifest.stats.total_domains);

    let mut top: Vec<_> = manifest.domain_counts.iter().collect();
    top.sort_by(|a, b| b.1.cmp(a.1));
    if !top.is_empty() {
        info!("Top domains:");
        for (domain, count) in top.into_iter().take(5) {
            info!("    {domain}: {count} pages");
        }
    }
    info!("{}", "=".repeat(60));
}
