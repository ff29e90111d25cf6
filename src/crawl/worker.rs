//! C9 - Page Worker: the per-URL state machine (§4.8). Fetch, then rewrite if HTML, then
//! store, then discover, as free functions over the components the Controller owns, mirroring
//! the original implementation's `fetch_page` / `rewrite_html_urls` / `save_page_content` /
//! `extract_urls` sequence.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use log::{info, warn};
use tokio::sync::Semaphore;
use url::Url;

use crate::asset_fetcher::AssetFetcher;
use crate::crawl::manifest::PageRecord;
use crate::html_rewriter;
use crate::http_client::page_headers;
use crate::rate_limiter::RateLimiter;
use crate::robots::RobotsOracle;
use crate::storage;
use crate::url_policy;

const USER_AGENT: &str = "WebArchiver/1.0";

pub struct ProcessResult {
    pub page_record: Option<PageRecord>,
    pub discovered: Vec<Url>,
    /// True for the error kinds §7 marks "counted as failed": non-200, timeout, network
    /// error, or a storage write failure. Robots denial is not counted here.
    pub failed: bool,
}

impl ProcessResult {
    fn dropped() -> Self {
        Self { page_record: None, discovered: Vec::new(), failed: false }
    }

    fn failed() -> Self {
        Self { page_record: None, discovered: Vec::new(), failed: true }
    }
}

/// Processes one admitted URL end to end. `visited` is the controller's canonical-URL
/// membership set, used by the HTML rewriter to decide `<a>` rewrite targets; it is not
/// mutated here. `semaphore` is the single global admission semaphore shared with asset
/// downloads (§5): it is held only for the page GET itself and released before rewriting,
/// so the asset fetches the rewrite triggers draw from the same combined cap without a
/// worker deadlocking itself by holding its own page-fetch permit across them.
#[allow(clippy::too_many_arguments)]
pub async fn process_url(
    url: &Url,
    depth: u32,
    client: &reqwest::Client,
    robots: &RobotsOracle,
    respect_robots: bool,
    rate_limiter: &RateLimiter,
    semaphore: &Semaphore,
    fetcher: &AssetFetcher,
    visited: &DashSet<String>,
    run_root: &Path,
) -> ProcessResult {
    if respect_robots && !robots.allow(url, USER_AGENT).await {
        info!("robots.txt disallows {url}");
        return ProcessResult::dropped();
    }

    let Some(host) = url.host_str().map(str::to_string) else {
        return ProcessResult::failed();
    };
    rate_limiter.acquire(&host).await;

    let (content_type, bytes) = {
        let _permit = semaphore.acquire().await;

        let response = client
            .get(url.clone())
            .headers(page_headers(None))
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                warn!("failed to fetch {url}: {e}");
                return ProcessResult::failed();
            }
        };

        if !response.status().is_success() {
            warn!("{url} returned HTTP {}", response.status());
            return ProcessResult::failed();
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("failed reading response body for {url}: {e}");
                return ProcessResult::failed();
            }
        };

        (content_type, bytes)
    };

    let size_bytes = bytes.len();
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let is_html = content_type.to_ascii_lowercase().contains("html");

    let (stored_content, discovered) = if is_html {
        let output = html_rewriter::rewrite_page(&text, url, visited, fetcher).await;
        (output.html, output.discovered_links)
    } else {
        (text, Vec::new())
    };

    let digest = url_policy::digest(url);
    let stored_path = storage::page_path(run_root, &digest, &content_type);
    if let Err(e) = storage::write_file(&stored_path, stored_content.as_bytes()).await {
        warn!("failed to store page {url}: {e}");
        return ProcessResult::failed();
    }

    let record = PageRecord {
        url: url.as_str().to_string(),
        fetched_at: Utc::now(),
        content_type,
        stored_path,
        depth,
        size_bytes,
        origin_host: host,
    };

    ProcessResult { page_record: Some(record), discovered, failed: false }
}
