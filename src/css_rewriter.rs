//! C8 - CSS Rewriter: finds `url(...)` references in CSS text and substitutes them with
//! local asset paths (§4.7). Pure with respect to CSS structure, this is a textual
//! scan/substitute, not a reparse.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::url_policy::AssetType;

/// Matches `url(...)`, tolerating optional single/double quotes and inner whitespace.
static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*(['"]?)([^'")]+?)\1\s*\)"#).unwrap());

/// A `url(...)` reference found in a CSS text, already resolved against the page base.
#[derive(Debug, Clone)]
pub struct CssUrlRef {
    /// The raw (unresolved) URL text exactly as it appeared inside `url(...)`.
    pub raw: String,
    /// `raw` resolved against the page base URL.
    pub absolute: Url,
}

/// Scans `css` for every non-`data:` `url(...)` reference, resolving each against `base`.
/// Unresolvable or `data:` references are skipped.
pub fn find_refs(css: &str, base: &Url) -> Vec<CssUrlRef> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    for caps in URL_TOKEN.captures_iter(css) {
        let raw = caps[2].trim().to_string();
        if raw.is_empty() || raw.starts_with("data:") || !seen.insert(raw.clone()) {
            continue;
        }
        if let Ok(absolute) = base.join(&raw) {
            refs.push(CssUrlRef { raw, absolute });
        }
    }
    refs
}

/// Classifies a `url(...)` reference as §4.7 specifies: **font** by extension, **image**
/// otherwise (the CSS rewriter only ever introduces these two types).
pub fn classify(raw_url: &str) -> AssetType {
    let lower = raw_url.to_ascii_lowercase();
    const FONT_EXTENSIONS: &[&str] = &[".woff2", ".woff", ".ttf", ".eot", ".otf"];
    if FONT_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        AssetType::Font
    } else {
        AssetType::Image
    }
}

/// Substitutes every `url(...)` token whose raw reference is a key in `subs` with
/// `url("../{local_path}")`, across the unquoted/single-quoted/double-quoted variants,
/// the original implementation's replace-all-three-variants approach, since a stylesheet
/// may spell the same reference with different quoting in different rules.
pub fn apply_substitutions(css: &str, subs: &HashMap<String, String>) -> String {
    let mut result = css.to_string();
    for (raw, local_path) in subs {
        let replacement = format!("url(\"../{local_path}\")");
        result = result.replace(&format!("url({raw})"), &replacement);
        result = result.replace(&format!("url(\"{raw}\")"), &replacement);
        result = result.replace(&format!("url('{raw}')"), &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://h/page").unwrap()
    }

    #[test]
    fn finds_unquoted_and_quoted_refs() {
        let css = r#"
            .a { background: url(bg.png); }
            .b { background: url("icon.svg"); }
            .c { background: url('font.woff2'); }
        "#;
        let refs = find_refs(css, &base());
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].raw, "bg.png");
        assert_eq!(refs[0].absolute.as_str(), "https://h/bg.png");
    }

    #[test]
    fn data_uris_are_skipped() {
        let css = "a { background: url(data:image/png;base64,AAAA); }";
        assert!(find_refs(css, &base()).is_empty());
    }

    #[test]
    fn classify_by_extension() {
        assert!(matches!(classify("a.woff2"), AssetType::Font));
        assert!(matches!(classify("a.ttf"), AssetType::Font));
        assert!(matches!(classify("a.png"), AssetType::Image));
    }

    #[test]
    fn substitution_covers_all_quote_variants() {
        let css = r#"url(bg.png) url("bg.png") url('bg.png')"#;
        let mut subs = HashMap::new();
        subs.insert("bg.png".to_string(), "images/deadbeef.png".to_string());
        let rewritten = apply_substitutions(css, &subs);
        assert_eq!(
            rewritten,
            r#"url("../images/deadbeef.png") url("../images/deadbeef.png") url("../images/deadbeef.png")"#
        );
    }
}
