//! C4 - HTTP Client: a long-lived `reqwest::Client` with browser-like headers, a shared
//! cookie jar, redirect following, and TLS verification disabled (per §4.4).
//!
//! Two header profiles are exposed, matching the original implementation's
//! `get_headers(referer, is_asset)`: [`page_headers`] for document GETs, [`asset_headers`]
//! for image/CSS/JS/font/media GETs. Both rotate a desktop-browser User-Agent from a
//! four-entry pool.

use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Picks one of the four rotating desktop User-Agent strings.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Builds the long-lived client: global + per-host connection caps, redirect following,
/// a session-wide cookie jar, TLS verification off, and the timeouts from §5.
pub fn build_client(max_workers: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(max_workers.max(1))
        .cookie_store(true)
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Header profile for a document GET: `Accept: text/html...`, `Sec-Fetch-Dest: document`.
pub fn page_headers(referer: Option<&str>) -> HeaderMap {
    let mut headers = common_headers();
    headers.insert(
        "Accept",
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    insert_referer(&mut headers, referer);
    headers
}

/// Header profile for an asset GET: `Accept: image/...`, `Sec-Fetch-Dest: image`,
/// `Sec-Fetch-Site: same-origin`.
pub fn asset_headers(referer: Option<&str>) -> HeaderMap {
    let mut headers = common_headers();
    headers.insert(
        "Accept",
        HeaderValue::from_static("image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"),
    );
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("image"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("no-cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    insert_referer(&mut headers, referer);
    headers
}

/// The minimal header set used for the one-shot 403 asset retry (§4.5 step 6):
/// User-Agent only.
pub fn minimal_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(random_user_agent()) {
        headers.insert("User-Agent", ua);
    }
    headers
}

fn common_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(random_user_agent()) {
        headers.insert("User-Agent", ua);
    }
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Accept-Encoding", HeaderValue::from_static("gzip, deflate, br"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

fn insert_referer(headers: &mut HeaderMap, referer: Option<&str>) {
    if let Some(referer) = referer
        && let Ok(value) = HeaderValue::from_str(referer)
    {
        headers.insert("Referer", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_user_agent_is_one_of_the_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn page_headers_carry_document_fetch_dest() {
        let headers = page_headers(None);
        assert_eq!(headers.get("Sec-Fetch-Dest").unwrap(), "document");
        assert!(!headers.contains_key("Referer"));
    }

    #[test]
    fn asset_headers_carry_image_fetch_dest_and_referer() {
        let headers = asset_headers(Some("https://h/page"));
        assert_eq!(headers.get("Sec-Fetch-Dest").unwrap(), "image");
        assert_eq!(headers.get("Referer").unwrap(), "https://h/page");
    }

    #[test]
    fn minimal_headers_carry_only_user_agent() {
        let headers = minimal_headers();
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("User-Agent"));
    }
}
