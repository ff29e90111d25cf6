//! Run manifest: `PageRecord`/`RunManifest` (§3) and the exact `metadata.json` schema
//! (§6), matching the original implementation's final `save_json(...)` call field for
//! field.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_type: String,
    pub stored_path: PathBuf,
    pub depth: u32,
    pub size_bytes: usize,
    pub origin_host: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Stats {
    pub pages_scraped: usize,
    pub pages_failed: usize,
    pub bytes_downloaded: u64,
    pub elapsed_seconds: f64,
    pub pages_per_second: f64,
    pub domain_counts: HashMap<String, usize>,
    pub total_domains: usize,
}

#[derive(Debug, Serialize)]
pub struct RunManifest {
    pub start_url: String,
    pub total_pages: usize,
    pub pages_scraped: usize,
    pub max_pages_limit: usize,
    pub pages_per_domain_limit: usize,
    pub timestamp: DateTime<Utc>,
    pub stats: Stats,
    pub domain_counts: HashMap<String, usize>,
    pub pages: HashMap<String, PageRecord>,
    pub asset_map: HashMap<String, String>,
    pub failed_assets: Vec<String>,
}

impl RunManifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_expected_top_level_keys() {
        let manifest = RunManifest {
            start_url: "https://h/".into(),
            total_pages: 1,
            pages_scraped: 1,
            max_pages_limit: 100,
            pages_per_domain_limit: 50,
            timestamp: Utc::now(),
            stats: Stats::default(),
            domain_counts: HashMap::new(),
            pages: HashMap::new(),
            asset_map: HashMap::new(),
            failed_assets: Vec::new(),
        };
        let json = manifest.to_json().unwrap();
        for key in [
            "start_url",
            "total_pages",
            "pages_scraped",
            "max_pages_limit",
            "pages_per_domain_limit",
            "timestamp",
            "stats",
            "domain_counts",
            "pages",
            "asset_map",
            "failed_assets",
        ] {
            assert!(json.contains(key), "missing key {key}");
        }
    }
}
