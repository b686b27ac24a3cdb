//! MIME type detection module
//!
//! Returns the corresponding Content-Type based on file extension.

use std::path::Path;

/// Get MIME Content-Type for a file path
///
/// # Examples
/// ```
/// use measurement_collector::http::mime::content_type_for;
/// use std::path::Path;
/// assert_eq!(content_type_for(Path::new("web/index.html")), "text/html; charset=utf-8");
/// assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
/// ```
pub fn content_type_for(path: &Path) -> &'static str {
    get_content_type(path.extension().and_then(|e| e.to_str()))
}

/// Get MIME Content-Type based on file extension
pub fn get_content_type(extension: Option<&str>) -> &'static str {
    match extension {
        // Text
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv",

        // Scripts and data
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",

        // Images
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",

        // Archives
        Some("gz" | "gzip") => "application/gzip",
        Some("zip") => "application/zip",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(get_content_type(Some("html")), "text/html; charset=utf-8");
        assert_eq!(get_content_type(Some("css")), "text/css");
        assert_eq!(get_content_type(Some("js")), "application/javascript");
        assert_eq!(get_content_type(Some("gz")), "application/gzip");
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for(Path::new("web/404.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("web/style.CSS")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("web/")), "application/octet-stream");
    }
}
