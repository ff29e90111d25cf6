//! Content storage (§4.9): digest-based file paths under the run root, created lazily.

use std::path::{Path, PathBuf};

use crate::error::ArchiverError;

/// Picks the stored-page extension from a response `Content-Type`, per §4.9:
/// `.json`, `.xml`, `.txt`, or `.html` (the default for HTML and any other text).
pub fn page_extension(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("json") {
        ".json"
    } else if content_type.contains("xml") {
        ".xml"
    } else if content_type.contains("html") {
        ".html"
    } else {
        ".txt"
    }
}

/// `{run_root}/html/{digest}{ext}` for a stored page.
pub fn page_path(run_root: &Path, digest: &str, content_type: &str) -> PathBuf {
    run_root.join("html").join(format!("{digest}{}", page_extension(content_type)))
}

/// Creates the parent directory of `path` if it does not already exist.
pub async fn ensure_parent_dir(path: &Path) -> Result<(), ArchiverError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ArchiverError::Storage { path: parent.to_path_buf(), source })?;
    }
    Ok(())
}

/// Writes `content` to `path`, creating parent directories as needed.
pub async fn write_file(path: &Path, content: &[u8]) -> Result<(), ArchiverError> {
    ensure_parent_dir(path).await?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ArchiverError::Storage { path: path.to_path_buf(), source })
}
