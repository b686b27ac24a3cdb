//! Static file serving module
//!
//! Serves pages from the static directory with `ETag` validation and the
//! configured 404 page.

use bytes::Bytes;
use http::Response;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::http::{cache, mime, response};
use crate::logger;

/// File served for directory requests
pub const INDEX_FILE: &str = "index.html";

/// Page served for unmatched paths
pub const NOT_FOUND_FILE: &str = "404.html";

/// Serve the page at `request_path` or the 404 page
pub async fn serve_page(
    static_dir: &Path,
    request_path: &str,
    if_none_match: Option<&str>,
) -> Response<Bytes> {
    match load_page(static_dir, request_path).await {
        Some((content, content_type)) => {
            let etag = cache::generate_etag(&content);
            if cache::check_etag_match(if_none_match, &etag) {
                return response::build_304_response(&etag);
            }
            response::build_cached_response(content, content_type, &etag)
        }
        None => serve_not_found(static_dir).await,
    }
}

/// 404 response carrying the static 404 page when it exists
pub async fn serve_not_found(static_dir: &Path) -> Response<Bytes> {
    let page = match fs::read(static_dir.join(NOT_FOUND_FILE)).await {
        Ok(content) => Some(Bytes::from(content)),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                logger::log_warning(&format!("Failed to read {NOT_FOUND_FILE}: {e}"));
            }
            None
        }
    };
    response::build_404_response(page)
}

/// Load a file below `static_dir`
///
/// Directory paths resolve to their index file. Returns `None` for missing
/// files and for paths that resolve outside the static directory.
pub async fn load_page(static_dir: &Path, request_path: &str) -> Option<(Bytes, &'static str)> {
    let file_path = resolve(static_dir, request_path).await?;
    match fs::read(&file_path).await {
        Ok(content) => Some((Bytes::from(content), mime::content_type_for(&file_path))),
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {e}",
                file_path.display()
            ));
            None
        }
    }
}

async fn resolve(static_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let static_dir_canonical = match fs::canonicalize(static_dir).await {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{}': {e}",
                static_dir.display()
            ));
            return None;
        }
    };

    let relative = request_path.trim_start_matches('/');
    let mut file_path = static_dir.join(relative);
    let is_dir = relative.is_empty()
        || relative.ends_with('/')
        || fs::metadata(&file_path).await.ok()?.is_dir();
    if is_dir {
        file_path = file_path.join(INDEX_FILE);
    }

    // File not found is common (404), no need to log at warning level
    let canonical = fs::canonicalize(&file_path).await.ok()?;
    if !canonical.starts_with(&static_dir_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {request_path} -> {}",
            canonical.display()
        ));
        return None;
    }
    if !fs::metadata(&canonical).await.ok()?.is_file() {
        return None;
    }
    Some(canonical)
}
