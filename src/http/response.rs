//! HTTP response building module
//!
//! Builders for the responses the collector sends. Framing headers
//! (`Content-Length`, `Date`, `Connection`) are added by the wire writer.

use bytes::Bytes;
use http::header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE, ETAG};
use http::{Response, StatusCode};

/// Methods accepted somewhere on the server, advertised on 405 and OPTIONS
pub const ALLOWED_METHODS: &str = "GET, HEAD, POST, OPTIONS";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Build plain-text response with the given status
pub fn build_text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Bytes> {
    let body = body.into();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, TEXT_PLAIN)
        .body(body.clone())
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(body)
        })
}

/// Build error response whose body is the canonical reason phrase
///
/// e.g. `400 Bad Request`
pub fn build_error_response(status: StatusCode) -> Response<Bytes> {
    let reason = status.canonical_reason().unwrap_or("Error");
    build_text_response(status, format!("{} {reason}", status.as_str()))
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(ETAG, etag)
        .header(CACHE_CONTROL, "no-cache")
        .body(Bytes::new())
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            Response::new(Bytes::new())
        })
}

/// Build 404 Not Found response from a page body
///
/// Falls back to plain text when no page is available.
pub fn build_404_response(page: Option<Bytes>) -> Response<Bytes> {
    let Some(page) = page else {
        return build_error_response(StatusCode::NOT_FOUND);
    };

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(page.clone())
        .unwrap_or_else(|e| {
            log_build_error("404", &e);
            Response::new(page)
        })
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Bytes> {
    let mut resp = build_error_response(StatusCode::METHOD_NOT_ALLOWED);
    resp.headers_mut()
        .insert(ALLOW, http::HeaderValue::from_static(ALLOWED_METHODS));
    resp
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ALLOW, ALLOWED_METHODS)
        .body(Bytes::new())
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(Bytes::new())
        })
}

/// Build success response with validation headers
pub fn build_cached_response(data: Bytes, content_type: &str, etag: &str) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(ETAG, etag)
        .header(CACHE_CONTROL, "no-cache")
        .body(data)
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            Response::new(Bytes::new())
        })
}

/// Log response build error
fn log_build_error(status: &str, error: &http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
