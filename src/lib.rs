pub mod asset_cache;
pub mod asset_fetcher;
pub mod config;
pub mod crawl;
pub mod css_rewriter;
pub mod error;
pub mod html_rewriter;
pub mod http_client;
pub mod rate_limiter;
pub mod robots;
pub mod storage;
pub mod url_policy;

pub use config::CrawlConfig;
pub use crawl::{Controller, PageRecord, ProgressSink, RunManifest};
pub use error::{ArchiverError, ArchiverResult};

/// Runs one archive pass to completion and returns the run manifest, the entry point
/// `main` and any embedder calls.
pub async fn run(config: CrawlConfig) -> ArchiverResult<RunManifest> {
    let controller = std::sync::Arc::new(Controller::new(config)?);
    controller.run().await
}
