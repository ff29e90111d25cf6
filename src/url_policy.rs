//! C1 - URL Policy: in-scope classification, asset classification, digests, and local
//! asset paths. Pure: no I/O, safe to call from any worker.

use url::Url;

/// Non-HTML resource kinds an HTML/CSS document can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    Image,
    Css,
    Js,
    Font,
    Media,
    Other,
}

impl AssetType {
    pub fn subdir(self) -> &'static str {
        match self {
            AssetType::Image => "images",
            AssetType::Css => "css",
            AssetType::Js => "js",
            AssetType::Font => "fonts",
            AssetType::Media => "media",
            AssetType::Other => "assets",
        }
    }

    fn default_ext(self) -> &'static str {
        match self {
            AssetType::Image => ".jpg",
            AssetType::Css => ".css",
            AssetType::Js => ".js",
            _ => ".bin",
        }
    }
}

const EXTENSION_BLACKLIST: &[&str] = &[
    "pdf", "zip", "exe", "dmg", "msi", "tar.gz", "rar", "doc", "docx", "xls", "xlsx",
];

const EXCLUDE_PATTERNS: &[&str] = &["/login", "/signin", "/signup", "/register", "/logout"];

const EXCLUDED_QUERY_KEYS: &[&str] = &["download", "login", "logout", "signin", "signup"];

/// Strips the fragment from a URL string, the normalization every dedup/fetch/storage
/// decision is keyed on (§3).
pub fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn path_extension(path: &str) -> Option<String> {
    let path = path.rsplit('/').next().unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    let dot = path.rfind('.')?;
    if dot == path.len() - 1 {
        return None;
    }
    Some(path[dot + 1..].to_ascii_lowercase())
}

/// True iff `url` is on the seed's host, is not a blacklisted download extension, does
/// not match an excluded path pattern or scheme, and carries no excluded query key.
pub fn in_scope(url: &Url, seed_host: &str) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };
    if host != seed_host {
        return false;
    }

    let path_lower = url.path().to_ascii_lowercase();
    if let Some(ext) = path_extension(&path_lower)
        && EXTENSION_BLACKLIST.contains(&ext.as_str())
    {
        return false;
    }

    let url_str = url.as_str();
    if EXCLUDE_PATTERNS.iter().any(|p| url_str.contains(p)) {
        return false;
    }
    if url_str.trim_end_matches('/').ends_with('#') {
        return false;
    }

    for (key, _) in url.query_pairs() {
        if EXCLUDED_QUERY_KEYS.contains(&key.as_ref()) {
            return false;
        }
    }

    true
}

/// True for link targets that should never be resolved/visited at all: fragment-only,
/// `javascript:`, `mailto:`, `tel:`.
pub fn is_unfollowable_href(href: &str) -> bool {
    let trimmed = href.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
}

/// Classifies a URL as an asset type by file extension. `None` means "not an asset by
/// URL" (the caller falls back to CSS/HTML context, which wins when present per §3).
pub fn classify_asset(url: &Url) -> Option<AssetType> {
    let ext = path_extension(url.path())?;
    Some(match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" => {
            AssetType::Image
        }
        "css" => AssetType::Css,
        "js" | "mjs" => AssetType::Js,
        "woff" | "woff2" | "ttf" | "eot" | "otf" => AssetType::Font,
        "mp4" | "webm" | "ogg" | "mp3" | "wav" => AssetType::Media,
        _ => return None,
    })
}

/// 128-bit hex digest over the canonical (fragment-stripped) URL bytes, used as the
/// filename stem for both pages and assets.
pub fn digest(url: &Url) -> String {
    let bytes = without_fragment(url).as_str().as_bytes().to_vec();
    format!("{:x}", md5::compute(bytes))
}

/// `{subdir}/{digest}{ext}` for an asset reference. `ext` comes from the URL path when
/// short and non-empty, else a type-specific default.
pub fn asset_local_path(url: &Url, asset_type: AssetType) -> String {
    let digest = digest(url);
    let ext = path_extension(url.path())
        .filter(|e| !e.is_empty() && e.len() <= 10)
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| asset_type.default_ext().to_string());
    format!("{}/{}{}", asset_type.subdir(), digest, ext)
}
