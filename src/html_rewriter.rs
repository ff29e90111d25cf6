//! C7 - HTML Rewriter: parses HTML, enumerates asset references, triggers C6 fetches,
//! and rewrites attributes, inline CSS, and intra-site links to local paths (§4.6).
//!
//! Two passes over the document: a read-only `scraper` pass enumerates every asset
//! reference and CSS-bearing text/attribute so the fetches (all async, many potentially
//! concurrent) can run before any rewriting begins; a streaming `lol_html` pass then
//! performs the actual attribute/text rewrite using the resolved URL → local-path map, the
//! same two-phase shape the teacher's link rewriter uses for its own outbound-link pass.

use std::collections::{HashMap, HashSet};

use dashmap::DashSet;
use lol_html::{ContentType, HtmlRewriter, Settings, element};
use log::warn;
use scraper::{Html, Selector};
use url::Url;

use crate::asset_fetcher::AssetFetcher;
use crate::css_rewriter;
use crate::url_policy::{self, AssetType};

const IMAGE_ATTRS: &[&str] = &["src", "srcset", "data-src", "data-srcset", "data-lazy-src"];

pub struct RewriteOutput {
    pub html: String,
    /// Every in-document `<a>`/`<area>` target, absolute, unfollowable hrefs excluded.
    /// The caller (Page Worker) filters these through URL Policy before enqueueing.
    pub discovered_links: Vec<Url>,
}

/// Runs the full rewrite pipeline for one page. `visited` is consulted (read-only) to
/// decide whether an anchor becomes a local `{digest}.html` link or is preserved as an
/// absolute external link (§4.6).
pub async fn rewrite_page(
    html: &str,
    base: &Url,
    visited: &DashSet<String>,
    fetcher: &AssetFetcher,
) -> RewriteOutput {
    let document = Html::parse_document(html);

    let mut url_types: HashMap<String, AssetType> = HashMap::new();
    let mut style_blocks: Vec<String> = Vec::new();
    let mut inline_style_attrs: Vec<String> = Vec::new();
    let mut discovered_links = Vec::new();

    collect_image_refs(&document, base, &mut url_types);
    collect_link_refs(&document, base, &mut url_types);
    collect_script_refs(&document, base, &mut url_types);
    collect_media_refs(&document, base, &mut url_types);
    collect_style_blocks(&document, &mut style_blocks);
    collect_inline_style_attrs(&document, &mut inline_style_attrs);
    collect_links(&document, base, &mut discovered_links);

    for block in style_blocks.iter().chain(inline_style_attrs.iter()) {
        for css_ref in css_rewriter::find_refs(block, base) {
            url_types
                .entry(css_ref.absolute.as_str().to_string())
                .or_insert_with(|| css_rewriter::classify(&css_ref.raw));
        }
    }

    let resolved = fetch_all(&url_types, base, fetcher).await;

    let rewritten_styles: Vec<String> = style_blocks
        .iter()
        .map(|css| rewrite_css_block(css, base, &resolved))
        .collect();

    let html = rewrite_stream(html, base, visited, &resolved, &rewritten_styles)
        .unwrap_or_else(|e| {
            warn!("HTML rewrite failed for {base}: {e}; storing raw content");
            html.to_string()
        });

    RewriteOutput { html, discovered_links }
}

async fn fetch_all(
    url_types: &HashMap<String, AssetType>,
    base: &Url,
    fetcher: &AssetFetcher,
) -> HashMap<String, Option<String>> {
    let referer = base.as_str();
    let futures = url_types.iter().filter_map(|(url_str, asset_type)| {
        let url = Url::parse(url_str).ok()?;
        let asset_type = *asset_type;
        Some(async move {
            let path = fetcher.fetch_asset(&url, asset_type, referer).await;
            (url_str.clone(), path)
        })
    });
    futures::future::join_all(futures).await.into_iter().collect()
}

fn rewrite_css_block(css: &str, base: &Url, resolved: &HashMap<String, Option<String>>) -> String {
    let mut subs = HashMap::new();
    for css_ref in css_rewriter::find_refs(css, base) {
        if let Some(Some(path)) = resolved.get(css_ref.absolute.as_str()) {
            subs.insert(css_ref.raw, path.clone());
        }
    }
    css_rewriter::apply_substitutions(css, &subs)
}

fn collect_image_refs(doc: &Html, base: &Url, out: &mut HashMap<String, AssetType>) {
    let Ok(selector) = Selector::parse("img, source, picture") else { return };
    for el in doc.select(&selector) {
        for attr in IMAGE_ATTRS {
            let Some(value) = el.value().attr(attr) else { continue };
            if attr.contains("srcset") {
                for (token, _) in srcset_candidates(value) {
                    if let Some(absolute) = resolve(base, token) {
                        out.entry(absolute.as_str().to_string()).or_insert(AssetType::Image);
                    }
                }
            } else if let Some(absolute) = resolve(base, value) {
                out.entry(absolute.as_str().to_string()).or_insert(AssetType::Image);
            }
        }
    }
}

fn collect_link_refs(doc: &Html, base: &Url, out: &mut HashMap<String, AssetType>) {
    let Ok(selector) = Selector::parse("link[href]") else { return };
    for el in doc.select(&selector) {
        let rel = el.value().attr("rel").unwrap_or("").to_ascii_lowercase();
        let Some(href) = el.value().attr("href") else { continue };
        let asset_type = if rel.contains("stylesheet") {
            AssetType::Css
        } else if rel.contains("font") {
            AssetType::Font
        } else {
            continue;
        };
        if let Some(absolute) = resolve(base, href) {
            out.entry(absolute.as_str().to_string()).or_insert(asset_type);
        }
    }
}

fn collect_script_refs(doc: &Html, base: &Url, out: &mut HashMap<String, AssetType>) {
    let Ok(selector) = Selector::parse("script[src]") else { return };
    for el in doc.select(&selector) {
        let Some(src) = el.value().attr("src") else { continue };
        if let Some(absolute) = resolve(base, src) {
            out.entry(absolute.as_str().to_string()).or_insert(AssetType::Js);
        }
    }
}

fn collect_media_refs(doc: &Html, base: &Url, out: &mut HashMap<String, AssetType>) {
    let Ok(selector) = Selector::parse("video[src], audio[src], source[src]") else { return };
    for el in doc.select(&selector) {
        let Some(src) = el.value().attr("src") else { continue };
        if let Some(absolute) = resolve(base, src) {
            out.entry(absolute.as_str().to_string()).or_insert(AssetType::Media);
        }
    }
}

fn collect_style_blocks(doc: &Html, out: &mut Vec<String>) {
    let Ok(selector) = Selector::parse("style") else { return };
    for el in doc.select(&selector) {
        out.push(el.text().collect::<String>());
    }
}

fn collect_inline_style_attrs(doc: &Html, out: &mut Vec<String>) {
    let Ok(selector) = Selector::parse("[style]") else { return };
    for el in doc.select(&selector) {
        if let Some(style) = el.value().attr("style") {
            out.push(style.to_string());
        }
    }
}

fn collect_links(doc: &Html, base: &Url, out: &mut Vec<Url>) {
    let Ok(selector) = Selector::parse("a[href], area[href]") else { return };
    for el in doc.select(&selector) {
        let Some(href) = el.value().attr("href") else { continue };
        if url_policy::is_unfollowable_href(href) {
            continue;
        }
        if let Some(absolute) = resolve(base, href) {
            out.push(absolute);
        }
    }
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    if href.trim().is_empty() || href.trim_start().starts_with("data:") {
        return None;
    }
    base.join(href).ok()
}

/// Splits a `srcset` value into `(url_token, descriptor)` pairs, per §4.6: comma-split
/// candidates, URL token is whatever precedes whitespace.
fn srcset_candidates(value: &str) -> Vec<(&str, &str)> {
    value
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.split_once(char::is_whitespace) {
                Some((url, descriptor)) => Some((url, descriptor.trim())),
                None => Some((part, "")),
            }
        })
        .collect()
}

fn rewrite_srcset(value: &str, base: &Url, resolved: &HashMap<String, Option<String>>) -> String {
    srcset_candidates(value)
        .into_iter()
        .map(|(token, descriptor)| {
            let new_url = match resolve(base, token).and_then(|abs| resolved.get(abs.as_str()).cloned()) {
                Some(Some(path)) => format!("../{path}"),
                Some(None) => resolve(base, token).map(|u| u.to_string()).unwrap_or_else(|| token.to_string()),
                None => token.to_string(),
            };
            if descriptor.is_empty() {
                new_url
            } else {
                format!("{new_url} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rewrites a single (non-srcset) attribute value: absolute-resolve, look up in the
/// resolved map, and either point at the local copy or fall back to the absolute URL,
/// never to a broken relative path (§4.6).
fn rewritten_attr_value(value: &str, base: &Url, resolved: &HashMap<String, Option<String>>) -> Option<String> {
    let absolute = resolve(base, value)?;
    match resolved.get(absolute.as_str()) {
        Some(Some(path)) => Some(format!("../{path}")),
        _ => Some(absolute.to_string()),
    }
}

fn rewrite_stream(
    html: &str,
    base: &Url,
    visited: &DashSet<String>,
    resolved: &HashMap<String, Option<String>>,
    rewritten_styles: &[String],
) -> Result<String, String> {
    let mut output = Vec::with_capacity(html.len());
    let style_index = std::sync::atomic::AtomicUsize::new(0);

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("img, source, picture", |el| {
                        for attr in IMAGE_ATTRS {
                            let Some(value) = el.get_attribute(attr) else { continue };
                            let new_value = if attr.contains("srcset") {
                                rewrite_srcset(&value, base, resolved)
                            } else if let Some(v) = rewritten_attr_value(&value, base, resolved) {
                                v
                            } else {
                                continue;
                            };
                            el.set_attribute(attr, &new_value)?;
                        }
                        Ok(())
                    }),
                    element!("link[href]", |el| {
                        let rel = el.get_attribute("rel").unwrap_or_default().to_ascii_lowercase();
                        if !rel.contains("stylesheet") && !rel.contains("font") {
                            return Ok(());
                        }
                        if let Some(href) = el.get_attribute("href")
                            && let Some(new_value) = rewritten_attr_value(&href, base, resolved)
                        {
                            el.set_attribute("href", &new_value)?;
                        }
                        Ok(())
                    }),
                    element!("script[src]", |el| {
                        if let Some(src) = el.get_attribute("src")
                            && let Some(new_value) = rewritten_attr_value(&src, base, resolved)
                        {
                            el.set_attribute("src", &new_value)?;
                        }
                        Ok(())
                    }),
                    element!("video[src], audio[src], source[src]", |el| {
                        if let Some(src) = el.get_attribute("src")
                            && let Some(new_value) = rewritten_attr_value(&src, base, resolved)
                        {
                            el.set_attribute("src", &new_value)?;
                        }
                        Ok(())
                    }),
                    element!("[style]", |el| {
                        if let Some(style) = el.get_attribute("style") {
                            let rewritten = rewrite_css_block(&style, base, resolved);
                            el.set_attribute("style", &rewritten)?;
                        }
                        Ok(())
                    }),
                    element!("style", |el| {
                        let idx = style_index.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        if let Some(text) = rewritten_styles.get(idx) {
                            el.set_inner_content(text, ContentType::Text);
                        }
                        Ok(())
                    }),
                    element!("a[href], area[href]", |el| {
                        let Some(href) = el.get_attribute("href") else { return Ok(()) };
                        if url_policy::is_unfollowable_href(&href) {
                            return Ok(());
                        }
                        let Some(absolute) = resolve(base, &href) else { return Ok(()) };
                        let canonical = url_policy::without_fragment(&absolute);
                        if visited.contains(canonical.as_str()) {
                            el.set_attribute(
                                "href",
                                &format!("{}.html", url_policy::digest(&canonical)),
                            )?;
                        } else {
                            el.set_attribute("href", absolute.as_str())?;
                        }
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter.write(html.as_bytes()).map_err(|e| e.to_string())?;
        rewriter.end().map_err(|e| e.to_string())?;
    }

    String::from_utf8(output).map_err(|e| e.to_string())
}

/// Retroactive inbound-link pass: rewrites any `<a>`/`<area>` href in an already-stored
/// page whose absolute, fragment-stripped target is in `stored_pages` to `{digest}.html`.
/// Hrefs that no longer parse as absolute URLs (already a local `{digest}.html` link, or
/// an unfollowable href left untouched by the first pass) are skipped. Called once after
/// the crawl drains, so links to pages crawled after their referring page was saved still
/// end up local (§4.6, §8 S2).
pub fn retrofit_links(html: &str, stored_pages: &HashSet<String>) -> Result<String, String> {
    let mut output = Vec::with_capacity(html.len());

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("a[href], area[href]", |el| {
                    let Some(href) = el.get_attribute("href") else { return Ok(()) };
                    let Ok(parsed) = Url::parse(&href) else { return Ok(()) };
                    let canonical = url_policy::without_fragment(&parsed);
                    if stored_pages.contains(canonical.as_str()) {
                        el.set_attribute(
                            "href",
                            &format!("{}.html", url_policy::digest(&canonical)),
                        )?;
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter.write(html.as_bytes()).map_err(|e| e.to_string())?;
        rewriter.end().map_err(|e| e.to_string())?;
    }

    String::from_utf8(output).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srcset_splits_url_and_descriptor() {
        let candidates = srcset_candidates("a.jpg 1x, b.jpg 2x");
        assert_eq!(candidates, vec![("a.jpg", "1x"), ("b.jpg", "2x")]);
    }

    #[test]
    fn srcset_without_descriptor() {
        assert_eq!(srcset_candidates("a.jpg"), vec![("a.jpg", "")]);
    }

    #[test]
    fn rewrite_srcset_uses_resolved_local_path() {
        let base = Url::parse("https://h/page").unwrap();
        let mut resolved = HashMap::new();
        resolved.insert("https://h/a.jpg".to_string(), Some("images/abc.jpg".to_string()));
        let out = rewrite_srcset("a.jpg 1x", &base, &resolved);
        assert_eq!(out, "../images/abc.jpg 1x");
    }

    #[test]
    fn rewrite_srcset_falls_back_to_absolute_on_failure() {
        let base = Url::parse("https://h/page").unwrap();
        let mut resolved = HashMap::new();
        resolved.insert("https://h/a.jpg".to_string(), None);
        let out = rewrite_srcset("a.jpg 1x", &base, &resolved);
        assert_eq!(out, "https://h/a.jpg 1x");
    }

    #[tokio::test]
    async fn anchor_to_visited_page_becomes_local_digest_link() {
        let base = Url::parse("http://h/a").unwrap();
        let target = Url::parse("http://h/b").unwrap();
        let visited = DashSet::new();
        visited.insert(url_policy::without_fragment(&target).as_str().to_string());

        let client = reqwest::Client::new();
        let dir = assert_fs::TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(
            client,
            dir.path().to_path_buf(),
            std::sync::Arc::new(crate::rate_limiter::RateLimiter::new(std::time::Duration::ZERO)),
            std::sync::Arc::new(tokio::sync::Semaphore::new(2)),
            true,
        );

        let html = r#"<html><body><a href="http://h/b">b</a></body></html>"#;
        let out = rewrite_page(html, &base, &visited, &fetcher).await;
        let expected_link = format!("{}.html", url_policy::digest(&target));
        assert!(out.html.contains(&expected_link), "{}", out.html);
    }

    #[tokio::test]
    async fn anchor_to_unvisited_page_stays_absolute() {
        let base = Url::parse("http://h/a").unwrap();
        let visited = DashSet::new();

        let client = reqwest::Client::new();
        let dir = assert_fs::TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(
            client,
            dir.path().to_path_buf(),
            std::sync::Arc::new(crate::rate_limiter::RateLimiter::new(std::time::Duration::ZERO)),
            std::sync::Arc::new(tokio::sync::Semaphore::new(2)),
            true,
        );

        let html = r#"<html><body><a href="http://other/x">x</a></body></html>"#;
        let out = rewrite_page(html, &base, &visited, &fetcher).await;
        assert!(out.html.contains("http://other/x"));
    }

    #[test]
    fn retrofit_rewrites_link_to_page_stored_after_the_fact() {
        let target = Url::parse("http://h/b").unwrap();
        let mut stored_pages = HashSet::new();
        stored_pages.insert(url_policy::without_fragment(&target).as_str().to_string());

        let html = r#"<html><body><a href="http://h/b">b</a></body></html>"#;
        let out = retrofit_links(html, &stored_pages).unwrap();
        let expected_link = format!("{}.html", url_policy::digest(&target));
        assert!(out.contains(&expected_link), "{out}");
    }

    #[test]
    fn retrofit_leaves_unstored_and_already_local_links_untouched() {
        let stored_pages = HashSet::new();
        let html = r#"<html><body><a href="http://other/x">x</a><a href="deadbeef.html">y</a></body></html>"#;
        let out = retrofit_links(html, &stored_pages).unwrap();
        assert!(out.contains("http://other/x"));
        assert!(out.contains("deadbeef.html"));
    }
}
