//! C6 - Asset Fetcher: downloads a referenced asset into the run tree, de-duplicating
//! through the asset cache and memoizing permanent failures (§4.5).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use url::Url;

use crate::asset_cache::{AssetCache, AssetOutcome, Reservation};
use crate::http_client::{asset_headers, minimal_headers};
use crate::rate_limiter::RateLimiter;
use crate::storage;
use crate::url_policy::{self, AssetType};

pub struct AssetFetcher {
    client: reqwest::Client,
    run_root: PathBuf,
    cache: AssetCache,
    rate_limiter: Arc<RateLimiter>,
    concurrency: Arc<Semaphore>,
    skip_assets: bool,
}

impl AssetFetcher {
    /// `concurrency` is the single global admission semaphore shared with the Page
    /// Worker's own GETs (§5): the Controller passes the same `Arc<Semaphore>` it hands
    /// to `worker::process_url`, so page and asset fetches draw from one combined cap of
    /// `max_workers` in-flight requests rather than two independent ones.
    pub fn new(
        client: reqwest::Client,
        run_root: PathBuf,
        rate_limiter: Arc<RateLimiter>,
        concurrency: Arc<Semaphore>,
        skip_assets: bool,
    ) -> Self {
        Self {
            client,
            run_root,
            cache: AssetCache::new(),
            rate_limiter,
            concurrency,
            skip_assets,
        }
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// `fetch_asset(url, type, referer) → relative_local_path | None` (§4.5).
    ///
    /// Strips the fragment, consults the positive/negative cache, and otherwise performs
    /// the rate-limited, semaphore-gated download exactly once per URL; concurrent
    /// callers for the same URL await the owning caller's result instead of duplicating
    /// the request.
    pub async fn fetch_asset(
        &self,
        url: &Url,
        asset_type: AssetType,
        referer: &str,
    ) -> Option<String> {
        if self.skip_assets {
            return None;
        }

        let clean = url_policy::without_fragment(url);
        let key = clean.as_str().to_string();

        match self.cache.reserve(&key) {
            Reservation::Settled(AssetOutcome::Stored(path)) => Some(path),
            Reservation::Settled(AssetOutcome::Failed) => None,
            Reservation::Await(receiver) => match Reservation::wait(receiver).await {
                AssetOutcome::Stored(path) => Some(path),
                AssetOutcome::Failed => None,
            },
            Reservation::Owned => {
                let outcome = self.download(&clean, asset_type, referer).await;
                let result = match &outcome {
                    AssetOutcome::Stored(path) => Some(path.clone()),
                    AssetOutcome::Failed => None,
                };
                self.cache.settle(&key, outcome);
                result
            }
        }
    }

    async fn download(&self, url: &Url, asset_type: AssetType, referer: &str) -> AssetOutcome {
        let Some(host) = url.host_str().map(str::to_string) else {
            return AssetOutcome::Failed;
        };

        self.rate_limiter.acquire(&host).await;
        let _permit = self.concurrency.acquire().await;

        let response = self
            .client
            .get(url.clone())
            .headers(asset_headers(Some(referer)))
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let response = match response {
            Ok(resp) if resp.status().as_u16() == 403 => {
                debug!("403 for asset {url}, retrying with minimal headers");
                match self
                    .client
                    .get(url.clone())
                    .headers(minimal_headers())
                    .timeout(Duration::from_secs(30))
                    .send()
                    .await
                {
                    Ok(retry) => retry,
                    Err(e) => {
                        warn!("asset retry failed for {url}: {e}");
                        return AssetOutcome::Failed;
                    }
                }
            }
            Ok(resp) => resp,
            Err(e) => {
                warn!("failed to fetch asset {url}: {e}");
                return AssetOutcome::Failed;
            }
        };

        if !response.status().is_success() {
            warn!("asset {url} returned HTTP {}", response.status());
            return AssetOutcome::Failed;
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("failed reading asset body for {url}: {e}");
                return AssetOutcome::Failed;
            }
        };

        let local_path = url_policy::asset_local_path(url, asset_type);
        let full_path = self.run_root.join(&local_path);

        let write_result = if matches!(asset_type, AssetType::Css | AssetType::Js) {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            storage::write_file(&full_path, text.as_bytes()).await
        } else {
            storage::write_file(&full_path, &bytes).await
        };

        match write_result {
            Ok(()) => {
                debug!("downloaded asset {url} -> {local_path}");
                AssetOutcome::Stored(local_path)
            }
            Err(e) => {
                warn!("failed to store asset {url}: {e}");
                AssetOutcome::Failed
            }
        }
    }
}

pub fn local_file_exists_and_nonempty(run_root: &Path, relative: &str) -> bool {
    let full = run_root.join(relative);
    full.metadata().map(|m| m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_policy::AssetType;

    fn fetcher(run_root: PathBuf, skip: bool) -> AssetFetcher {
        AssetFetcher::new(
            reqwest::Client::new(),
            run_root,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            Arc::new(Semaphore::new(4)),
            skip,
        )
    }

    #[tokio::test]
    async fn skip_assets_short_circuits() {
        let dir = assert_fs::TempDir::new().unwrap();
        let fetcher = fetcher(dir.path().to_path_buf(), true);
        let url = Url::parse("https://h/logo.png").unwrap();
        assert_eq!(fetcher.fetch_asset(&url, AssetType::Image, "https://h/").await, None);
    }

    #[tokio::test]
    async fn duplicate_fetch_of_settled_failure_is_none_without_retry() {
        let dir = assert_fs::TempDir::new().unwrap();
        let fetcher = fetcher(dir.path().to_path_buf(), false);
        fetcher.cache.settle("https://h/missing.png", AssetOutcome::Failed);
        let url = Url::parse("https://h/missing.png").unwrap();
        assert_eq!(fetcher.fetch_asset(&url, AssetType::Image, "https://h/").await, None);
    }
}
