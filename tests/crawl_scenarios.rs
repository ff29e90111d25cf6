//! Integration tests driving a full crawl against a stub HTTP server, covering admission,
//! dedup, robots gating, and link/asset rewriting end to end.

use std::time::Duration;

use webarchiver::config::CrawlConfigBuilder;

fn default_config(start_url: String, storage_dir: &std::path::Path) -> webarchiver::CrawlConfig {
    CrawlConfigBuilder::new()
        .storage_dir(storage_dir)
        .start_url(start_url)
        .max_workers(4)
        .respect_robots_txt(false)
        .skip_assets(true)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap()
}

#[tokio::test]
async fn seed_only_page_produces_one_record() {
    let mut server = mockito::Server::new_async().await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>hello</body></html>")
        .create_async()
        .await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = default_config(format!("{}/a", server.url()), dir.path());
    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 1);
    assert!(manifest.asset_map.is_empty());
    assert!(manifest.failed_assets.is_empty());
}

#[tokio::test]
async fn same_host_link_is_rewritten_to_local_digest() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(r#"<html><body><a href="{base}/b">b</a></body></html>"#))
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>leaf</body></html>")
        .create_async()
        .await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = default_config(format!("{base}/a"), dir.path());
    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 2);
    let a_record = manifest.pages.get(&format!("{base}/a")).expect("a stored");
    let a_html = std::fs::read_to_string(&a_record.stored_path).unwrap();
    let b_url = url::Url::parse(&format!("{base}/b")).unwrap();
    let expected_link = format!("{}.html", webarchiver::url_policy::digest(&b_url));
    assert!(a_html.contains(&expected_link), "{a_html}");
}

#[tokio::test]
async fn external_link_stays_absolute() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<html><body><a href="http://other-host.invalid/x">x</a></body></html>"#)
        .create_async()
        .await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = default_config(format!("{base}/a"), dir.path());
    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 1);
    let a_record = manifest.pages.get(&format!("{base}/a")).unwrap();
    let a_html = std::fs::read_to_string(&a_record.stored_path).unwrap();
    assert!(a_html.contains("http://other-host.invalid/x"));
}

#[tokio::test]
async fn duplicate_asset_reference_is_fetched_once() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(
            r#"<html><body><a href="{base}/b">b</a><img src="{base}/logo.png"></body></html>"#
        ))
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(r#"<html><body><img src="{base}/logo.png"></body></html>"#))
        .create_async()
        .await;
    let logo = server
        .mock("GET", "/logo.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(vec![0u8; 16])
        .expect(1)
        .create_async()
        .await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = CrawlConfigBuilder::new()
        .storage_dir(dir.path())
        .start_url(format!("{base}/a"))
        .max_workers(4)
        .skip_assets(false)
        .respect_robots_txt(false)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap();

    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.asset_map.len(), 1);
    logo.assert_async().await;
}

#[tokio::test]
async fn per_origin_cap_limits_pages_from_one_host() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(
            r#"<html><body><a href="{base}/b">b</a><a href="{base}/c">c</a></body></html>"#
        ))
        .create_async()
        .await;
    let b_mock = server.mock("GET", "/b").with_status(200).expect(0).create_async().await;
    let c_mock = server.mock("GET", "/c").with_status(200).expect(0).create_async().await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = CrawlConfigBuilder::new()
        .storage_dir(dir.path())
        .start_url(format!("{base}/a"))
        .pages_per_domain(1)
        .respect_robots_txt(false)
        .skip_assets(true)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap();

    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 1);
    assert_eq!(*manifest.domain_counts.values().next().unwrap(), 1);
    b_mock.assert_async().await;
    c_mock.assert_async().await;
}

#[tokio::test]
async fn robots_disallowed_page_is_dropped_without_fetch() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private\n")
        .create_async()
        .await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(r#"<html><body><a href="{base}/private">p</a></body></html>"#))
        .create_async()
        .await;
    let private_mock = server
        .mock("GET", "/private")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>secret</html>")
        .expect(0)
        .create_async()
        .await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = CrawlConfigBuilder::new()
        .storage_dir(dir.path())
        .start_url(format!("{base}/a"))
        .respect_robots_txt(true)
        .skip_assets(true)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap();

    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 1);
    let a_record = manifest.pages.values().next().unwrap();
    let a_html = std::fs::read_to_string(&a_record.stored_path).unwrap();
    assert!(a_html.contains(&format!("{base}/private")));
    private_mock.assert_async().await;
}

#[tokio::test]
async fn max_depth_zero_yields_only_seed() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(r#"<html><body><a href="{base}/b">b</a></body></html>"#))
        .create_async()
        .await;
    let b_mock = server.mock("GET", "/b").with_status(200).expect(0).create_async().await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = CrawlConfigBuilder::new()
        .storage_dir(dir.path())
        .start_url(format!("{base}/a"))
        .max_depth(0)
        .respect_robots_txt(false)
        .skip_assets(true)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap();

    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 1);
    b_mock.assert_async().await;
}

#[tokio::test]
async fn pages_per_domain_zero_drops_everything() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let a_mock = server.mock("GET", "/a").with_status(200).expect(0).create_async().await;

    let dir = assert_fs::TempDir::new().unwrap();
    let cfg = CrawlConfigBuilder::new()
        .storage_dir(dir.path())
        .start_url(format!("{base}/a"))
        .pages_per_domain(0)
        .respect_robots_txt(false)
        .skip_assets(true)
        .request_delay(Duration::ZERO)
        .build()
        .unwrap();

    let manifest = webarchiver::run(cfg).await.unwrap();

    assert_eq!(manifest.total_pages, 0);
    assert!(manifest.pages.is_empty());
    a_mock.assert_async().await;
}
